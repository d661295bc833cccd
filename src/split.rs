use crate::{
  class::class_of,
  free_list::FreeLists,
  header::HEADER_SIZE,
  heap::{BlockRef, HeapRegion},
};

/// Smallest remainder worth turning into its own free block: a header plus
/// room for a link.
pub const MIN_REMAINDER: usize = HEADER_SIZE + size_of::<usize>();

/// Trims a removed free block down to `size` bytes, listing the remainder.
///
/// Leaves the block whole when the remainder would be smaller than
/// [`MIN_REMAINDER`]. Returns the remainder block if one was created.
pub fn split(
  heap: &mut HeapRegion,
  lists: &mut FreeLists,
  block: BlockRef,
  size: usize,
) -> Option<BlockRef> {
  let original = heap.header(block).size;
  debug_assert!(original >= size);

  let remainder_size = original - size;
  if remainder_size < MIN_REMAINDER {
    return None;
  }

  let remainder = heap.carve(block, size);
  lists.insert(heap, remainder, class_of(remainder_size));

  Some(remainder)
}
