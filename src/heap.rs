//! Heap region bookkeeping and the only place that touches heap memory.
//!
//! Blocks are named by their byte offset from the heap base ([`BlockRef`]).
//! Headers are read and written through [`HeapRegion::header`] and
//! [`HeapRegion::store`]; link words store absolute addresses, translated here.

use std::ptr::NonNull;

use crate::{
  GRANULE,
  error::HeapError,
  extend::HeapExtend,
  header::{HEADER_SIZE, Header, RawHeader},
};

/// Offset of a block header from the heap base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRef(usize);

impl BlockRef {
  pub const fn offset(self) -> usize {
    self.0
  }
}

#[derive(Debug)]
pub struct HeapRegion {
  base: NonNull<u8>,
  /// Bytes between base and end.
  len: usize,
  total_blocks: usize,
}

impl HeapRegion {
  pub const fn new() -> Self {
    Self {
      base: NonNull::dangling(),
      len: 0,
      total_blocks: 0,
    }
  }

  /// Starts an empty heap at the current end of `extender`.
  ///
  /// An unaligned end is padded up to the next 16-byte boundary. Nothing is
  /// modified on failure.
  pub fn init(
    &mut self,
    extender: &mut impl HeapExtend,
  ) -> Result<(), HeapError> {
    let end = extender.extend(0).map_err(HeapError::Init)?;

    let padding = end.addr().get().next_multiple_of(GRANULE) - end.addr().get();
    if padding > 0 {
      extender.extend(padding).map_err(HeapError::Init)?;
    }

    self.base = unsafe { end.add(padding) };
    self.len = 0;
    self.total_blocks = 0;

    log::debug!("heap initialized at {:p}", self.base);

    Ok(())
  }

  /// Extends the heap by one block of `size` bytes and returns it.
  ///
  /// The new block carries a fresh header and is not in any free list.
  pub fn grow(
    &mut self,
    extender: &mut impl HeapExtend,
    size: usize,
  ) -> Result<BlockRef, HeapError> {
    debug_assert!(size >= HEADER_SIZE && size.is_multiple_of(GRANULE));

    let exhausted = |source| {
      log::warn!("heap exhausted: cannot grow by {size} bytes");
      HeapError::Exhausted {
        requested: size,
        source,
      }
    };

    // Checked before growing so a refused grow never consumes break memory.
    let expected = self.end_addr();
    let current = extender.extend(0).map_err(exhausted)?;
    if current.addr().get() != expected {
      log::warn!("heap break moved from {expected:#x} to {current:p} outside the allocator");
      return Err(HeapError::ForeignBreak {
        expected,
        found: current.addr().get(),
      });
    }

    let previous = extender.extend(size).map_err(exhausted)?;
    debug_assert_eq!(previous, current);

    let block = BlockRef(self.len);
    self.len += size;
    self.total_blocks += 1;
    self.store(block, Header::fresh(size));

    log::trace!("heap grown by {size} bytes, end = {:#x}", self.end_addr());

    Ok(block)
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  /// Bytes currently covered by blocks.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn total_blocks(&self) -> usize {
    self.total_blocks
  }

  fn end_addr(&self) -> usize {
    self.base.addr().get() + self.len
  }

  fn raw(
    &self,
    block: BlockRef,
  ) -> NonNull<RawHeader> {
    assert!(
      block.0 + HEADER_SIZE <= self.len && block.0.is_multiple_of(GRANULE),
      "block offset {:#x} outside heap of {:#x} bytes",
      block.0,
      self.len
    );
    // in bounds per the assertion above; alignment follows from the 16-byte base.
    unsafe { self.base.add(block.0).cast::<RawHeader>() }
  }

  pub fn header(
    &self,
    block: BlockRef,
  ) -> Header {
    unsafe { self.raw(block).read() }.decode()
  }

  pub fn store(
    &mut self,
    block: BlockRef,
    header: Header,
  ) {
    unsafe { self.raw(block).write(header.encode()) }
  }

  /// Absolute address to put in a link word.
  pub fn address_of(
    &self,
    block: BlockRef,
  ) -> usize {
    self.base.addr().get() + block.0
  }

  /// Inverse of [`address_of`](Self::address_of).
  pub fn block_at(
    &self,
    address: usize,
  ) -> BlockRef {
    BlockRef(address - self.base.addr().get())
  }

  /// The free-list successor recorded in `header`.
  pub fn successor(
    &self,
    header: &Header,
  ) -> Option<BlockRef> {
    (!header.list_end).then(|| self.block_at(header.next))
  }

  /// The block physically following `block`, if any.
  pub fn next_in_memory(
    &self,
    block: BlockRef,
    header: &Header,
  ) -> Option<BlockRef> {
    let next = block.0 + header.size;
    (next < self.len).then_some(BlockRef(next))
  }

  pub fn first_block(&self) -> Option<BlockRef> {
    (!self.is_empty()).then_some(BlockRef(0))
  }

  /// Cuts `block` down to `size` bytes and writes a free header for the rest.
  ///
  /// The remainder is not inserted into any list.
  pub fn carve(
    &mut self,
    block: BlockRef,
    size: usize,
  ) -> BlockRef {
    let mut header = self.header(block);
    debug_assert!(header.size >= size + HEADER_SIZE);

    let remainder = BlockRef(block.0 + size);
    let remainder_size = header.size - size;

    header.size = size;
    self.store(block, header);
    self.store(remainder, Header::fresh(remainder_size));
    self.total_blocks += 1;

    remainder
  }

  /// Folds the block right after `lower` into it.
  pub fn absorb(
    &mut self,
    lower: BlockRef,
    upper: BlockRef,
  ) {
    let mut header = self.header(lower);
    let upper_size = self.header(upper).size;
    debug_assert_eq!(lower.0 + header.size, upper.0);

    header.size += upper_size;
    self.store(lower, header);
    self.total_blocks -= 1;
  }

  /// Pointer to the first payload byte of `block`.
  pub fn payload(
    &self,
    block: BlockRef,
  ) -> NonNull<u8> {
    unsafe { self.raw(block).cast::<u8>().add(HEADER_SIZE) }
  }

  /// The block whose payload starts at `payload`, if it lies in this heap.
  pub fn block_of(
    &self,
    payload: NonNull<u8>,
  ) -> Option<BlockRef> {
    let offset = payload
      .addr()
      .get()
      .checked_sub(self.base.addr().get() + HEADER_SIZE)?;

    (offset < self.len && offset.is_multiple_of(GRANULE)).then_some(BlockRef(offset))
  }

  /// Walks the blocks in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      heap: self,
      cursor: self.first_block(),
    }
  }
}

impl Default for HeapRegion {
  fn default() -> Self {
    Self::new()
  }
}

pub struct Blocks<'a> {
  heap: &'a HeapRegion,
  cursor: Option<BlockRef>,
}

impl Iterator for Blocks<'_> {
  type Item = (BlockRef, Header);

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.cursor?;
    let header = self.heap.header(block);
    debug_assert!(header.size >= HEADER_SIZE, "corrupt header at {block:?}");

    self.cursor = if header.size == 0 {
      None
    } else {
      self.heap.next_in_memory(block, &header)
    };

    Some((block, header))
  }
}
