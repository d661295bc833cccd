//! Lazy whole-heap coalescing.
//!
//! Frees never merge neighbours. Instead, once enough of the heap is free, a
//! single address-ordered pass folds every run of adjacent free blocks into
//! one and rebuilds the free lists from scratch.

use crate::{
  class::class_of,
  free_list::FreeLists,
  heap::{BlockRef, HeapRegion},
};

/// When the allocator runs a coalescing pass.
///
/// A pass runs at the start of an allocation when the heap holds at least
/// `min_blocks` blocks and `free_blocks << free_ratio_shift >= total_blocks`,
/// i.e. at least one block in `2^free_ratio_shift` is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescePolicy {
  pub min_blocks: usize,
  pub free_ratio_shift: u32,
}

impl CoalescePolicy {
  /// A policy that never triggers; passes then only run on request.
  pub const fn never() -> Self {
    Self {
      min_blocks: usize::MAX,
      free_ratio_shift: 0,
    }
  }

  pub fn should_coalesce(
    &self,
    total_blocks: usize,
    free_blocks: usize,
  ) -> bool {
    total_blocks >= self.min_blocks
      && free_blocks
        .checked_shl(self.free_ratio_shift)
        .is_none_or(|scaled| scaled >= total_blocks)
  }
}

impl Default for CoalescePolicy {
  fn default() -> Self {
    Self {
      min_blocks: 50,
      free_ratio_shift: 3,
    }
  }
}

/// Merges adjacent free blocks across the whole heap and relists them.
pub fn coalesce(
  heap: &mut HeapRegion,
  lists: &mut FreeLists,
) {
  let before = heap.total_blocks();
  lists.clear();

  let mut run: Option<BlockRef> = None;
  let mut cursor = heap.first_block();

  while let Some(block) = cursor {
    let header = heap.header(block);
    cursor = heap.next_in_memory(block, &header);

    if header.allocated {
      if let Some(start) = run.take() {
        relist(heap, lists, start);
      }
    } else if let Some(start) = run {
      heap.absorb(start, block);
    } else {
      run = Some(block);
    }
  }

  if let Some(start) = run {
    relist(heap, lists, start);
  }

  log::debug!(
    "coalesced heap: {before} -> {} blocks, {} free",
    heap.total_blocks(),
    lists.free_blocks()
  );
}

fn relist(
  heap: &mut HeapRegion,
  lists: &mut FreeLists,
  block: BlockRef,
) {
  let size = heap.header(block).size;
  lists.insert(heap, block, class_of(size));
}
