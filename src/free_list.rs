//! The table of segregated free lists.
//!
//! Each bucket is an intrusive singly-linked list threaded through the link
//! words of free block headers. New nodes go to the head, so a list is in
//! most-recently-freed order. An empty bucket is a `None` head; the last node
//! of a non-empty bucket carries the list-end flag instead of a null link.

use crate::{
  class::CLASS_COUNT,
  heap::{BlockRef, HeapRegion},
};

#[derive(Debug)]
pub struct FreeLists {
  heads: [Option<BlockRef>; CLASS_COUNT],
  free_blocks: usize,
}

impl FreeLists {
  pub const fn new() -> Self {
    Self {
      heads: [None; CLASS_COUNT],
      free_blocks: 0,
    }
  }

  /// Forgets every list. Headers in the heap are left untouched.
  pub fn clear(&mut self) {
    self.heads = [None; CLASS_COUNT];
    self.free_blocks = 0;
  }

  pub fn free_blocks(&self) -> usize {
    self.free_blocks
  }

  pub fn head(
    &self,
    class: usize,
  ) -> Option<BlockRef> {
    self.heads[class]
  }

  /// Marks `block` free and pushes it onto bucket `class`.
  pub fn insert(
    &mut self,
    heap: &mut HeapRegion,
    block: BlockRef,
    class: usize,
  ) {
    let mut header = heap.header(block);
    header.allocated = false;

    match self.heads[class] {
      Some(head) => {
        header.next = heap.address_of(head);
        header.list_end = false;
      }
      None => {
        header.next = 0;
        header.list_end = true;
      }
    }

    heap.store(block, header);
    self.heads[class] = Some(block);
    self.free_blocks += 1;
  }

  /// Unlinks `block` from bucket `class`.
  ///
  /// `predecessor` must be the node right before `block`, or `None` when
  /// `block` is the head.
  pub fn remove(
    &mut self,
    heap: &mut HeapRegion,
    block: BlockRef,
    predecessor: Option<BlockRef>,
    class: usize,
  ) {
    let mut header = heap.header(block);
    let successor = heap.successor(&header);

    match predecessor {
      None => {
        debug_assert_eq!(self.heads[class], Some(block));
        self.heads[class] = successor;
      }
      Some(predecessor) => {
        let mut previous = heap.header(predecessor);
        debug_assert_eq!(heap.successor(&previous), Some(block));
        if header.list_end {
          previous.list_end = true;
        } else {
          previous.next = header.next;
        }
        heap.store(predecessor, previous);
      }
    }

    header.list_end = false;
    heap.store(block, header);
    self.free_blocks -= 1;
  }

  /// Walks bucket `class` from head to tail.
  pub fn iter<'a>(
    &self,
    heap: &'a HeapRegion,
    class: usize,
  ) -> Iter<'a> {
    Iter {
      heap,
      cursor: self.heads[class],
    }
  }
}

impl Default for FreeLists {
  fn default() -> Self {
    Self::new()
  }
}

pub struct Iter<'a> {
  heap: &'a HeapRegion,
  cursor: Option<BlockRef>,
}

impl Iterator for Iter<'_> {
  type Item = BlockRef;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.cursor?;
    self.cursor = self.heap.successor(&self.heap.header(block));
    Some(block)
  }
}
