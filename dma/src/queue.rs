//! Bidirectional DMA transport (spec.md §4.2).
//!
//! A queue is single-threaded: all of `read`/`write`/`write_short`/
//! `send_completion`/`progress`/`arm` are called from the one polling-group
//! thread that owns it (spec.md §5). Multiple queues run concurrently on
//! different threads, each within its own polling group.

use std::collections::VecDeque;
use std::sync::Arc;

use vnic_abi::{Error, Result};

use crate::completion::{Completion, DmaStatus};
use crate::keys::{LKey, RKey};
use crate::sim::SimHostMemory;

pub struct DmaQueueConfig {
    pub tx_ring_size: u32,
    pub rx_ring_size: u32,
    pub tx_element_size: u32,
    pub rx_element_size: u32,
    /// Max payload size `write_short` will send inline, synchronously.
    pub inline_threshold: usize,
}

impl Default for DmaQueueConfig {
    fn default() -> Self {
        Self {
            tx_ring_size: 256,
            rx_ring_size: 256,
            tx_element_size: 64,
            rx_element_size: 64,
            inline_threshold: 64,
        }
    }
}

struct PendingCompletion {
    completion: Completion,
    status: DmaStatus,
}

/// A bidirectional DMA transport bound to one protection domain.
///
/// Data movement for `read`/`write` happens synchronously against the
/// backing [`SimHostMemory`] (there is no real asynchronous hardware in
/// this control plane's test/sim harness); only completion *delivery* is
/// deferred to [`DmaQueue::progress`], preserving the real contract that
/// callers must drive progress before they can observe a completion.
pub struct DmaQueue {
    config: DmaQueueConfig,
    mem: Arc<SimHostMemory>,
    pending: VecDeque<PendingCompletion>,
    rx_callback: Option<Box<dyn FnMut(&[u8]) + Send>>,
    sent_completions: Vec<Vec<u8>>,
    armed: bool,
}

impl DmaQueue {
    pub fn new(config: DmaQueueConfig, mem: Arc<SimHostMemory>) -> Self {
        Self {
            config,
            mem,
            pending: VecDeque::new(),
            rx_callback: None,
            sent_completions: Vec::new(),
            armed: false,
        }
    }

    pub fn config(&self) -> &DmaQueueConfig {
        &self.config
    }

    /// Register the callback invoked when firmware tunnels a new descriptor
    /// header (spec.md §4.2's "rx callback").
    pub fn set_rx_callback(&mut self, cb: impl FnMut(&[u8]) + Send + 'static) {
        self.rx_callback = Some(Box::new(cb));
    }

    /// Test/firmware-injection hook: deliver a header as if it arrived over
    /// the wire.
    pub fn deliver_rx(&mut self, header: &[u8]) {
        if let Some(cb) = &mut self.rx_callback {
            cb(header);
        }
    }

    pub fn read(
        &mut self,
        local: &mut [u8],
        local_lkey: LKey,
        remote_addr: u64,
        rkey: RKey,
        completion: Completion,
    ) -> Result<()> {
        let _ = local_lkey;
        let status = self.mem.read_into(remote_addr, rkey, local);
        self.pending.push_back(PendingCompletion { completion, status });
        Ok(())
    }

    pub fn write(
        &mut self,
        local: &[u8],
        local_lkey: LKey,
        remote_addr: u64,
        rkey: RKey,
        completion: Completion,
    ) -> Result<()> {
        let _ = local_lkey;
        let status = self.mem.write_from(remote_addr, rkey, local);
        self.pending.push_back(PendingCompletion { completion, status });
        Ok(())
    }

    /// Inline write below the inline threshold. Synchronous: returns once
    /// the data has landed, no completion object involved (spec.md §4.2).
    pub fn write_short(&mut self, local: &[u8], remote_addr: u64, rkey: RKey) -> Result<()> {
        if local.len() > self.config.inline_threshold {
            return Err(Error::BadArgument(format!(
                "write_short payload {} exceeds inline threshold {}",
                local.len(),
                self.config.inline_threshold
            )));
        }
        match self.mem.write_from(remote_addr, rkey, local) {
            DmaStatus::Success => Ok(()),
            DmaStatus::Error(e) => Err(Error::DmaFailure(e)),
        }
    }

    /// Send a completion message to the host (spec.md §4.4 `cmd_complete`).
    /// Recorded in send order so ordering-sensitive tests (in-order
    /// completion delivery) can assert on it.
    pub fn send_completion(&mut self, message: &[u8]) -> Result<()> {
        self.sent_completions.push(message.to_vec());
        Ok(())
    }

    /// Messages sent so far, in send order.
    pub fn sent_completions(&self) -> &[Vec<u8>] {
        &self.sent_completions
    }

    /// Poll tx and rx: deliver every completion queued since the last call.
    /// Returns the number of completions delivered.
    pub fn progress(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(pending) = self.pending.pop_front() {
            pending.completion.charge(pending.status);
            delivered += 1;
        }
        delivered
    }

    /// Request the next completion event (for event-driven mode); a no-op
    /// marker in this sim harness beyond recording the arm state.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Drive progress until every currently-pending completion has fired.
    pub fn flush(&mut self) {
        while !self.pending.is_empty() {
            self.progress();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod queue_tests;
