//! Descriptor entries and the pool they're drawn from (spec.md §3
//! "Descriptor entry", §4.4 "Descriptor fetch").

use vnic_abi::constants::{VIRTQ_DESC_F_NEXT, VIRTQ_DESC_F_WRITE};

/// A raw virtio descriptor, adopted bit-for-bit from the virtio spec
/// (spec.md §1 Non-goals: wire layouts are not redefined here).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorEntry {
    pub addr: u64,
    pub len: u32,
    pub flags: u16,
    pub next: u16,
}

impl DescriptorEntry {
    pub fn has_next(&self) -> bool {
        self.flags & VIRTQ_DESC_F_NEXT != 0
    }

    pub fn is_write(&self) -> bool {
        self.flags & VIRTQ_DESC_F_WRITE != 0
    }
}

/// Fixed-size descriptor-entry arena (spec.md §3: "pool is static-size =
/// ring size; never overflows because host-visible queue depth bounds it").
///
/// Entries are plain values, not references into shared storage: "drawing"
/// one just checks out a capacity unit, and "returning" one on command
/// completion gives the unit back. This is the Rust-native stand-in for the
/// original free-list-of-linked-descriptor-structs.
pub struct DescriptorPool {
    capacity: usize,
    in_use: usize,
}

impl DescriptorPool {
    pub fn new(ring_size: u16) -> Self {
        Self {
            capacity: ring_size as usize,
            in_use: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.capacity - self.in_use
    }

    /// Draw `count` descriptor-entry units for a new command's chain.
    /// Fails if the pool doesn't have that many free, which cannot happen
    /// under the host-visible queue-depth bound spec.md §3 describes for a
    /// well-behaved driver, but is still checked rather than assumed.
    pub fn draw(&mut self, count: usize) -> Option<()> {
        if count > self.available() {
            return None;
        }
        self.in_use += count;
        Some(())
    }

    /// Return `count` descriptor-entry units on command completion/destroy.
    pub fn give_back(&mut self, count: usize) {
        self.in_use = self.in_use.saturating_sub(count);
    }
}

#[cfg(test)]
mod descriptor_tests;
