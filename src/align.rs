/// Rounds a value up to the allocator granularity (16 bytes).
///
/// # Examples
///
/// ```rust
/// use segfit::align;
///
/// assert_eq!(align!(0), 0);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(33), 48);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::GRANULE - 1) & !($crate::GRANULE - 1)
  };
}
