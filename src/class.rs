//! Size-class index.
//!
//! A block's class is the position of its highest set bit, counted from bit 3.
//! Block sizes are multiples of 16, so bit 3 never contributes and class 0
//! stays empty; the 60-entry table covers highest bits 3 through 62.

/// Number of free-list buckets.
pub const CLASS_COUNT: usize = 60;

const FIRST_SCANNED_BIT: u32 = 3;

/// Maps a byte size to its free-list bucket.
///
/// Sizes with no bit set from bit 3 upward land in class 0. Sizes with bit 63
/// set are clamped into the last class; the facade never produces them.
pub const fn class_of(size: usize) -> usize {
  let scanned = size >> FIRST_SCANNED_BIT;
  if scanned == 0 {
    return 0;
  }

  let highest = (usize::BITS - 1 - scanned.leading_zeros()) as usize;
  if highest < CLASS_COUNT { highest } else { CLASS_COUNT - 1 }
}
