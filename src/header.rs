//! Block header codec.
//!
//! Every block starts with a 16-byte header made of two machine words:
//!
//! ```text
//!   size word                          link word
//!   ┌──────────────────────────┬───┬───┐ ┌──────────────────────────┬───┬───┐
//!   │ size (bits 4-63)         │ - │ A │ │ next free (bits 4-63)    │ - │ E │
//!   └──────────────────────────┴───┴───┘ └──────────────────────────┴───┴───┘
//!                                  bit 0                                bit 0
//!   A = allocated                        E = last node of its free list
//! ```
//!
//! Sizes and addresses are multiples of 16, so their low four bits are free to
//! carry flags. Only [`RawHeader`] ever sees the packed form; the rest of the
//! allocator works with the decoded [`Header`].

#[cfg(not(target_pointer_width = "64"))]
compile_error!("the block header layout assumes 64-bit machine words");

/// Allocation granularity. Every block address and size is a multiple of it.
pub const GRANULE: usize = 16;

/// Bytes taken by a block header.
pub const HEADER_SIZE: usize = size_of::<RawHeader>();

/// Largest block size the size-class table can index (highest bit 62).
pub const MAX_BLOCK_SIZE: usize = (1 << 63) - GRANULE;

const FLAG_BITS: usize = GRANULE - 1;
const ALLOCATED: usize = 0x1;
const LIST_END: usize = 0x1;

/// The header exactly as it sits in heap memory.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawHeader {
  pub size_word: usize,
  pub link_word: usize,
}
const _: () = assert!(size_of::<RawHeader>() == 2 * size_of::<usize>());
const _: () = assert!(size_of::<RawHeader>() == GRANULE);

/// Decoded block header with explicit flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
  /// Total block size, header included.
  pub size: usize,
  pub allocated: bool,
  /// Address of the next free block in the same size class. Meaningless when
  /// `list_end` is set or the block is allocated.
  pub next: usize,
  pub list_end: bool,
}

impl RawHeader {
  pub const fn decode(self) -> Header {
    Header {
      size: self.size_word & !FLAG_BITS,
      allocated: self.size_word & ALLOCATED != 0,
      next: self.link_word & !FLAG_BITS,
      list_end: self.link_word & LIST_END != 0,
    }
  }

  /// Overwrites the size bits, keeping this word's flag bits.
  pub const fn set_size(
    &mut self,
    size: usize,
  ) {
    self.size_word = (size & !FLAG_BITS) | (self.size_word & FLAG_BITS);
  }

  /// Overwrites the address bits, keeping this word's flag bits.
  pub const fn set_next(
    &mut self,
    next: usize,
  ) {
    self.link_word = (next & !FLAG_BITS) | (self.link_word & FLAG_BITS);
  }

  pub const fn set_allocated(
    &mut self,
    allocated: bool,
  ) {
    if allocated {
      self.size_word |= ALLOCATED;
    } else {
      self.size_word &= !ALLOCATED;
    }
  }

  pub const fn set_list_end(
    &mut self,
    list_end: bool,
  ) {
    if list_end {
      self.link_word |= LIST_END;
    } else {
      self.link_word &= !LIST_END;
    }
  }
}

impl Header {
  pub const fn encode(self) -> RawHeader {
    let mut raw = RawHeader {
      size_word: 0,
      link_word: 0,
    };
    raw.set_size(self.size);
    raw.set_next(self.next);
    raw.set_allocated(self.allocated);
    raw.set_list_end(self.list_end);
    raw
  }

  /// A fresh header as written at the old heap end by a heap extension.
  pub const fn fresh(size: usize) -> Self {
    Self {
      size,
      allocated: false,
      next: 0,
      list_end: false,
    }
  }

  /// Payload bytes available after the header.
  pub const fn payload_size(&self) -> usize {
    self.size - HEADER_SIZE
  }
}

/// Block size needed to hold `requested` payload bytes.
///
/// Returns `None` if the rounded size overflows or is beyond [`MAX_BLOCK_SIZE`].
pub fn aligned_size(requested: usize) -> Option<usize> {
  let total = requested.checked_add(HEADER_SIZE)?;
  (total <= MAX_BLOCK_SIZE).then(|| crate::align!(total))
}
