use thiserror::Error;

/// The heap extension primitive refused to move the break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("heap extension by {increment} bytes refused")]
pub struct ExtendError {
  pub increment: usize,
}

impl ExtendError {
  pub fn new(increment: usize) -> Self {
    Self { increment }
  }
}

/// Why an allocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
  #[error("failed to query the initial heap end")]
  Init(#[source] ExtendError),

  #[error("heap exhausted while growing for a {requested}-byte block")]
  Exhausted {
    requested: usize,
    #[source]
    source: ExtendError,
  },

  #[error("request for {requested} bytes exceeds the largest block size")]
  TooLarge { requested: usize },

  #[error("heap break moved elsewhere (expected {expected:#x}, found {found:#x})")]
  ForeignBreak { expected: usize, found: usize },
}
