//! Polling groups (spec.md §3 "Polling group", §4.5 "Queue scheduling",
//! §5 "Scheduling model").
//!
//! Polling groups are a fixed array sized by the caller at controller open;
//! queues are round-robined across them. A queue belongs to at most one
//! group, and groups are never shared between threads — spec.md §5's
//! spinlock-around-queue-list pattern is realised here with a
//! `std::sync::Mutex` guarding each group's queue-index list so a queue can
//! still be scheduled/descheduled from an arbitrary thread during resume.

use std::sync::Mutex;

/// One cooperative scheduling bucket, owned by one I/O thread (spec.md §3).
pub struct PollingGroup {
    pub id: u32,
    queues: Mutex<Vec<u16>>,
}

impl PollingGroup {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            queues: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_indices(&self) -> Vec<u16> {
        self.queues.lock().unwrap().clone()
    }

    pub fn add_queue(&self, index: u16) {
        let mut q = self.queues.lock().unwrap();
        if !q.contains(&index) {
            q.push(index);
        }
    }

    pub fn remove_queue(&self, index: u16) {
        self.queues.lock().unwrap().retain(|&i| i != index);
    }

    pub fn len(&self) -> usize {
        self.queues.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-size table of polling groups, sized by `npgs` at controller open.
/// Assignment is round-robin over queue creation order (spec.md §4.5
/// "Queue scheduling").
pub struct PollingGroups {
    groups: Vec<PollingGroup>,
    next: Mutex<u32>,
}

impl PollingGroups {
    pub fn new(npgs: u32) -> Self {
        Self {
            groups: (0..npgs).map(PollingGroup::new).collect(),
            next: Mutex::new(0),
        }
    }

    pub fn len(&self) -> u32 {
        self.groups.len() as u32
    }

    pub fn group(&self, id: u32) -> Option<&PollingGroup> {
        self.groups.get(id as usize)
    }

    pub fn groups(&self) -> &[PollingGroup] {
        &self.groups
    }

    /// Assign `queue_index` to the next group in round-robin order and
    /// return the chosen group id.
    pub fn assign(&self, queue_index: u16) -> u32 {
        let mut next = self.next.lock().unwrap();
        let id = *next;
        *next = (*next + 1) % self.groups.len().max(1) as u32;
        self.groups[id as usize].add_queue(queue_index);
        id
    }

    pub fn unassign(&self, queue_index: u16) {
        for group in &self.groups {
            group.remove_queue(queue_index);
        }
    }
}
