use std::{fmt, ptr::NonNull};

use crate::{
  class::{CLASS_COUNT, class_of},
  coalesce::{self, CoalescePolicy},
  error::HeapError,
  extend::{HeapExtend, MmapArena, Sbrk},
  free_list::FreeLists,
  header::{HEADER_SIZE, aligned_size},
  heap::{BlockRef, HeapRegion},
  split::split,
};

/// Payload handle returned by [`SegFitAllocator::allocate`].
///
/// It is neither `Copy` nor `Clone`; [`SegFitAllocator::free`] consumes it.
#[derive(PartialEq, Eq, Hash)]
pub struct Allocation {
  ptr: NonNull<u8>,
}

impl Allocation {
  pub fn as_ptr(&self) -> *mut u8 {
    self.ptr.as_ptr()
  }

  pub fn addr(&self) -> usize {
    self.ptr.addr().get()
  }
}

impl fmt::Debug for Allocation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "Allocation({:p})", self.ptr)
  }
}

/// One block as seen by a heap walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the block header from the heap base.
  pub offset: usize,
  /// Total size, header included.
  pub size: usize,
  pub allocated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub heap_bytes: usize,
  pub total_blocks: usize,
  pub free_blocks: usize,
  /// Sum of block sizes over every free list.
  pub free_list_bytes: usize,
}

/// A segregated-fits allocator over a heap grown through `E`.
pub struct SegFitAllocator<E: HeapExtend> {
  extender: E,
  heap: HeapRegion,
  lists: FreeLists,
  policy: CoalescePolicy,
  initialized: bool,
}

impl SegFitAllocator<Sbrk> {
  /// An allocator on the process break.
  ///
  /// # Safety
  ///
  /// Same contract as [`Sbrk::new`].
  pub unsafe fn with_sbrk() -> Self {
    Self::new(unsafe { Sbrk::new() })
  }
}

impl SegFitAllocator<MmapArena> {
  /// An allocator on a private reservation of `capacity` bytes.
  pub fn with_capacity(capacity: usize) -> std::io::Result<Self> {
    Ok(Self::new(MmapArena::reserve(capacity)?))
  }
}

impl<E: HeapExtend> SegFitAllocator<E> {
  pub fn new(extender: E) -> Self {
    Self::with_policy(extender, CoalescePolicy::default())
  }

  pub fn with_policy(
    extender: E,
    policy: CoalescePolicy,
  ) -> Self {
    Self {
      extender,
      heap: HeapRegion::new(),
      lists: FreeLists::new(),
      policy,
      initialized: false,
    }
  }

  pub fn policy(&self) -> CoalescePolicy {
    self.policy
  }

  pub fn extender(&self) -> &E {
    &self.extender
  }

  /// Hands out a block with room for at least `size` payload bytes.
  ///
  /// The payload is 16-byte aligned. A zero-byte request gets a header-only
  /// block.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Allocation, HeapError> {
    if !self.initialized {
      self.heap.init(&mut self.extender)?;
      self.lists.clear();
      self.initialized = true;
    } else if self
      .policy
      .should_coalesce(self.heap.total_blocks(), self.lists.free_blocks())
    {
      self.coalesce();
    }

    let Some(required) = aligned_size(size) else {
      log::warn!("allocation of {size} bytes is larger than any block");
      return Err(HeapError::TooLarge { requested: size });
    };

    let block = match self.find_block(required) {
      Some(block) => block,
      None => self.heap.grow(&mut self.extender, required)?,
    };

    let mut header = self.heap.header(block);
    header.allocated = true;
    self.heap.store(block, header);

    let ptr = self.heap.payload(block);
    log::trace!("allocate({size}) -> {ptr:p}, block of {} bytes", header.size);

    Ok(Allocation { ptr })
  }

  /// Returns a block to its free list. Neighbours are merged lazily by the
  /// next coalescing pass.
  ///
  /// # Safety
  ///
  /// `allocation` must have been returned by this allocator.
  pub unsafe fn free(
    &mut self,
    allocation: Allocation,
  ) {
    let block = self.block_of(&allocation);
    let size = self.heap.header(block).size;

    self.lists.insert(&mut self.heap, block, class_of(size));

    log::trace!("free({:p}), block of {size} bytes", allocation.ptr);
  }

  /// Runs a coalescing pass now, regardless of the policy.
  pub fn coalesce(&mut self) {
    coalesce::coalesce(&mut self.heap, &mut self.lists);
  }

  /// Payload bytes available behind `allocation`.
  pub fn usable_size(
    &self,
    allocation: &Allocation,
  ) -> usize {
    self.heap.header(self.block_of(allocation)).payload_size()
  }

  /// The payload behind `allocation`.
  ///
  /// # Panics
  ///
  /// If `allocation` does not point into this allocator's heap.
  pub fn payload_mut(
    &mut self,
    allocation: &Allocation,
  ) -> &mut [u8] {
    let block = self.block_of(allocation);
    let len = self.heap.header(block).payload_size();
    let ptr = self.heap.payload(block);
    unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) }
  }

  /// Walks every block in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.heap.blocks().map(|(block, header)| BlockInfo {
      offset: block.offset(),
      size: header.size,
      allocated: header.allocated,
    })
  }

  /// Number of nodes in each size-class list.
  pub fn free_list_lens(&self) -> [usize; CLASS_COUNT] {
    std::array::from_fn(|class| self.lists.iter(&self.heap, class).count())
  }

  pub fn stats(&self) -> HeapStats {
    let free_list_bytes = (0..CLASS_COUNT)
      .flat_map(|class| self.lists.iter(&self.heap, class))
      .map(|block| self.heap.header(block).size)
      .sum();

    HeapStats {
      heap_bytes: self.heap.len(),
      total_blocks: self.heap.total_blocks(),
      free_blocks: self.lists.free_blocks(),
      free_list_bytes,
    }
  }

  fn block_of(
    &self,
    allocation: &Allocation,
  ) -> BlockRef {
    self.heap.block_of(allocation.ptr).unwrap_or_else(|| {
      panic!("{allocation:?} does not belong to this heap")
    })
  }

  /// Takes a free block of at least `required` bytes out of the lists.
  ///
  /// The block's own class is searched first-fit without splitting; failing
  /// that, the head of the next non-empty larger class is split to size.
  fn find_block(
    &mut self,
    required: usize,
  ) -> Option<BlockRef> {
    let class = class_of(required);

    let mut predecessor = None;
    let mut fit = None;
    for block in self.lists.iter(&self.heap, class) {
      if self.heap.header(block).size >= required {
        fit = Some(block);
        break;
      }
      predecessor = Some(block);
    }

    if let Some(block) = fit {
      self.lists.remove(&mut self.heap, block, predecessor, class);
      return Some(block);
    }

    let (larger, block) = (class + 1..CLASS_COUNT)
      .find_map(|larger| self.lists.head(larger).map(|block| (larger, block)))?;

    self.lists.remove(&mut self.heap, block, None, larger);
    split(&mut self.heap, &mut self.lists, block, required);

    Some(block)
  }
}

impl<E: HeapExtend> fmt::Debug for SegFitAllocator<E> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("SegFitAllocator")
      .field("base", &self.heap.base())
      .field("heap_bytes", &self.heap.len())
      .field("total_blocks", &self.heap.total_blocks())
      .field("free_blocks", &self.lists.free_blocks())
      .field("policy", &self.policy)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{GRANULE, error::ExtendError};

  fn allocator() -> SegFitAllocator<MmapArena> {
    SegFitAllocator::with_capacity(1 << 24).unwrap()
  }

  #[test]
  fn test_alloc() {
    let mut allocator = allocator();

    let first = allocator.allocate(8).unwrap();
    allocator.payload_mut(&first)[..8].copy_from_slice(&3u64.to_ne_bytes());

    let second = allocator.allocate(12).unwrap();
    for (i, byte) in allocator.payload_mut(&second)[..12].iter_mut().enumerate() {
      *byte = i as u8 + 1;
    }

    assert_eq!(&allocator.payload_mut(&first)[..8], &3u64.to_ne_bytes());
    assert_eq!(
      &allocator.payload_mut(&second)[..12],
      &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
    );

    let first_addr = first.addr();
    unsafe { allocator.free(first) };

    let third = allocator.allocate(4).unwrap();
    assert_eq!(third.addr(), first_addr);

    unsafe { allocator.free(third) };

    let fourth = allocator.allocate(64).unwrap();
    assert!(fourth.addr() > second.addr());
  }

  #[test]
  fn test_payload_alignment_and_size() {
    let mut allocator = allocator();

    for size in [0, 1, 15, 16, 17, 100, 4096] {
      let allocation = allocator.allocate(size).unwrap();
      assert!(allocation.addr().is_multiple_of(GRANULE));
      assert!(allocator.usable_size(&allocation) >= size);
      assert!(allocator.usable_size(&allocation) < size + GRANULE);
    }
  }

  #[test]
  fn test_zero_size_gets_header_only_block() {
    let mut allocator = allocator();

    let allocation = allocator.allocate(0).unwrap();

    assert_eq!(allocator.usable_size(&allocation), 0);
    assert!(allocator.payload_mut(&allocation).is_empty());
    assert_eq!(
      allocator.blocks().collect::<Vec<_>>(),
      [BlockInfo {
        offset: 0,
        size: HEADER_SIZE,
        allocated: true
      }]
    );
  }

  #[test]
  fn test_free_and_reuse_conserve_bytes() {
    let mut allocator = SegFitAllocator::with_policy(
      MmapArena::reserve(1 << 20).unwrap(),
      CoalescePolicy::never(),
    );

    let big = allocator.allocate(1000).unwrap();
    let _guard = allocator.allocate(16).unwrap();
    assert_eq!(allocator.stats().free_list_bytes, 0);

    unsafe { allocator.free(big) };
    assert_eq!(allocator.stats().free_list_bytes, 1024);

    // 1024 sits in class 7; a 48-byte block comes from class 2, so the search
    // escalates and splits.
    let small = allocator.allocate(20).unwrap();
    assert_eq!(allocator.usable_size(&small), 32);
    assert_eq!(allocator.stats().free_list_bytes, 1024 - 48);
    assert_eq!(allocator.stats().total_blocks, 3);
  }

  #[test]
  fn test_same_class_is_first_fit_without_split() {
    let mut allocator = SegFitAllocator::with_policy(
      MmapArena::reserve(1 << 20).unwrap(),
      CoalescePolicy::never(),
    );

    // 528-byte and 1008-byte blocks both live in class 6.
    let a = allocator.allocate(512).unwrap();
    let _guard_a = allocator.allocate(0).unwrap();
    let b = allocator.allocate(992).unwrap();
    let _guard_b = allocator.allocate(0).unwrap();
    let (a_addr, b_addr) = (a.addr(), b.addr());

    unsafe {
      allocator.free(a);
      allocator.free(b);
    }
    assert_eq!(allocator.free_list_lens()[6], 2);

    // b was freed last, so it heads the list and is the first fit.
    let c = allocator.allocate(640).unwrap();
    assert_eq!(c.addr(), b_addr);
    assert_eq!(allocator.usable_size(&c), 992);
    assert_eq!(allocator.free_list_lens()[6], 1);

    let d = allocator.allocate(600).unwrap();
    assert_ne!(d.addr(), a_addr);
    assert_eq!(allocator.free_list_lens()[6], 1);
  }

  #[test]
  fn test_exhaustion_leaves_state_intact() {
    let mut allocator = SegFitAllocator::with_capacity(256).unwrap();

    let first = allocator.allocate(100).unwrap();
    let before = allocator.stats();

    let err = allocator.allocate(200).unwrap_err();
    assert!(matches!(err, HeapError::Exhausted { requested: 224, .. }));
    assert_eq!(allocator.stats(), before);

    unsafe { allocator.free(first) };
    assert!(allocator.allocate(100).is_ok());
  }

  #[test]
  fn test_too_large_request() {
    let mut allocator = allocator();

    assert_eq!(
      allocator.allocate(usize::MAX).unwrap_err(),
      HeapError::TooLarge {
        requested: usize::MAX
      }
    );
    assert_eq!(allocator.stats().heap_bytes, 0);
  }

  #[test]
  fn test_lazy_coalescing_kicks_in() {
    let mut allocator = allocator();

    let handles: Vec<_> = (0..64).map(|_| allocator.allocate(48).unwrap()).collect();
    assert_eq!(allocator.stats().total_blocks, 64);

    // Free eight neighbours: 8 * 8 >= 64 arms the trigger.
    let mut kept = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
      if (8..16).contains(&i) {
        unsafe { allocator.free(handle) };
      } else {
        kept.push(handle);
      }
    }
    assert_eq!(allocator.stats().free_blocks, 8);

    let merged = allocator.allocate(8 * 64 - HEADER_SIZE).unwrap();

    assert_eq!(allocator.usable_size(&merged), 8 * 64 - HEADER_SIZE);
    assert_eq!(allocator.stats().total_blocks, 57);
    assert_eq!(allocator.stats().free_blocks, 0);
    assert_eq!(allocator.stats().heap_bytes, 64 * 64);
    assert_eq!(merged.addr(), kept[7].addr() + 64);
  }

  /// Refuses every request, including the initial query.
  struct NoHeap {
    calls: usize,
  }

  unsafe impl HeapExtend for NoHeap {
    fn extend(
      &mut self,
      increment: usize,
    ) -> Result<NonNull<u8>, ExtendError> {
      self.calls += 1;
      Err(ExtendError::new(increment))
    }
  }

  #[test]
  fn test_init_failure_touches_nothing() {
    let mut allocator = SegFitAllocator::new(NoHeap { calls: 0 });

    let err = allocator.allocate(64).unwrap_err();
    assert_eq!(err, HeapError::Init(ExtendError::new(0)));
    assert_eq!(allocator.stats(), HeapStats::default());
    assert_eq!(allocator.free_list_lens(), [0; CLASS_COUNT]);
    assert_eq!(allocator.blocks().count(), 0);

    // Still uninitialized, so the next call queries the heap end again.
    let err = allocator.allocate(0).unwrap_err();
    assert!(matches!(err, HeapError::Init(_)));
    assert_eq!(allocator.extender().calls, 2);
  }

  #[test]
  fn test_foreign_break_does_not_leak() {
    let mut allocator = allocator();
    allocator.allocate(100).unwrap();

    allocator.extender.extend(16).unwrap();
    let used = allocator.extender().used();

    for _ in 0..10 {
      let err = allocator.allocate(1000).unwrap_err();
      assert!(matches!(err, HeapError::ForeignBreak { .. }));
    }

    assert_eq!(allocator.extender().used(), used);
    assert_eq!(allocator.stats().heap_bytes, 128);
  }

  #[test]
  #[should_panic(expected = "does not belong to this heap")]
  fn test_foreign_handle_panics() {
    let mut one = allocator();
    let mut other = allocator();

    let allocation = one.allocate(32).unwrap();
    other.allocate(32).unwrap();
    other.payload_mut(&allocation);
  }
}
