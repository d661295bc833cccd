#![allow(dead_code)]

use segfit::{Allocation, HeapExtend, SegFitAllocator};

/// Deterministic 31-bit linear congruential generator.
#[derive(Debug, Clone)]
pub struct Lcg(u32);

impl Lcg {
  pub fn new(seed: u32) -> Self {
    Self(seed)
  }

  pub fn next_u31(&mut self) -> u32 {
    self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12_345) & 0x7fff_ffff;
    self.0
  }
}

/// Byte stream derived from `seed`, four bytes per draw, low byte first.
fn pattern(seed: u32) -> impl Iterator<Item = u8> {
  let mut rng = Lcg::new(seed);
  std::iter::repeat_with(move || rng.next_u31().to_le_bytes()).flatten()
}

pub fn fill(
  buf: &mut [u8],
  seed: u32,
) {
  for (byte, value) in buf.iter_mut().zip(pattern(seed)) {
    *byte = value;
  }
}

/// Returns the offset of the first byte that differs from the pattern.
pub fn verify(
  buf: &[u8],
  seed: u32,
) -> Result<(), usize> {
  match buf.iter().zip(pattern(seed)).position(|(&byte, value)| byte != value) {
    Some(offset) => Err(offset),
    None => Ok(()),
  }
}

/// A test-side record of one allocation.
#[derive(Debug)]
pub struct Slot {
  pub len: usize,
  pub seed: u32,
  pub allocation: Option<Allocation>,
}

/// Asserts that no two live allocations overlap.
pub fn assert_disjoint<E: HeapExtend>(
  allocator: &SegFitAllocator<E>,
  slots: &[Slot],
) {
  let mut ranges: Vec<_> = slots
    .iter()
    .filter_map(|slot| slot.allocation.as_ref())
    .map(|allocation| {
      let start = allocation.addr();
      (start, start + allocator.usable_size(allocation))
    })
    .collect();
  ranges.sort_unstable();

  for pair in ranges.windows(2) {
    assert!(pair[0].0 != pair[1].0, "duplicate handle {:#x}", pair[0].0);
    assert!(pair[0].1 <= pair[1].0, "overlap: {:x?} and {:x?}", pair[0], pair[1]);
  }
}

/// Asserts that the blocks tile the heap without gaps.
pub fn assert_tiled<E: HeapExtend>(allocator: &SegFitAllocator<E>) {
  let stats = allocator.stats();
  let mut expected = 0;
  let mut count = 0;
  for block in allocator.blocks() {
    assert_eq!(block.offset, expected);
    assert!(block.size.is_multiple_of(segfit::GRANULE));
    expected += block.size;
    count += 1;
  }
  assert_eq!(expected, stats.heap_bytes);
  assert_eq!(count, stats.total_blocks);
}
