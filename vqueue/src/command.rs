//! In-flight command state (spec.md §3 "Command").

use vnic_dma::Completion;

use crate::descriptor::DescriptorEntry;

/// One in-flight virtqueue command.
///
/// `id` matches the descriptor-head index in the host ring (spec.md §3);
/// at most one outstanding DMA chain exists per command at a time, enforced
/// by `Virtqueue::descs_rw` gating new chains on `pending_completion` and
/// clearing it once `progress()` drains that chain's completion.
pub struct Command {
    pub id: u16,
    pub descs: Vec<DescriptorEntry>,
    /// Bytes moved across every `descs_rw` chain charged so far (spec.md §3
    /// "consumed length"), accumulated as each chain's completion drains.
    pub consumed_len: u32,
    pub pending_completion: bool,
    /// Set once this command has been told its final status but, under
    /// `IN_ORDER_COMPLETIONS`, may still be waiting behind older commands
    /// before its completion is actually sent (spec.md §4.4 `cmd_complete`).
    pub done: Option<CommandOutcome>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    pub status: u8,
    pub len: u32,
}

impl Command {
    pub fn new(id: u16, descs: Vec<DescriptorEntry>) -> Self {
        Self {
            id,
            descs,
            consumed_len: 0,
            pending_completion: false,
            done: None,
        }
    }

    /// The first descriptor marked `WRITE`: the boundary between request
    /// and response sections (spec.md §4.4 "Edge-case policies").
    pub fn first_writable(&self) -> Option<usize> {
        self.descs.iter().position(|d| d.is_write())
    }

    /// The first readable descriptor (request section).
    pub fn first_readable(&self) -> Option<usize> {
        self.descs.iter().position(|d| !d.is_write())
    }
}

/// Charges a command's outstanding DMA pieces against one shared
/// completion, calling `on_fatal` on any non-success status (spec.md §4.4
/// "Read/write chain": "on any DMA error, the callback receives a
/// non-success status and the command is marked fatal"). The single path
/// both `Virtqueue::descs_rw` and its tests charge completions through.
pub fn chain_completion(
    count: usize,
    on_fatal: impl Fn() + Send + Sync + 'static,
    on_done: impl FnMut(bool) + Send + 'static,
) -> Completion {
    let mut on_done = on_done;
    Completion::new(count, move |status| {
        let ok = status.is_success();
        if !ok {
            on_fatal();
        }
        on_done(ok);
    })
}

#[cfg(test)]
mod command_tests;
