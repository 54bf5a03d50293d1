//! The descriptor-chain engine itself (spec.md §4.4).
//!
//! ```text
//!            create
//!     [RUNNING] ──suspend──▶ [FLUSHING] ──(inflight==∅)──▶ [SUSPENDED] ──resume──▶ [RUNNING]
//!                                                               │
//!                                                               └──destroy──▶ (gone)
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use vnic_abi::{Error, Result};
use vnic_dma::{CrossMkey, DmaQueue, LKey, RKey};

use crate::command::{chain_completion, Command, CommandOutcome};
use crate::descriptor::{DescriptorEntry, DescriptorPool};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VqState {
    Running,
    Flushing,
    Suspended,
}

/// A descriptor-chain engine bound to one DMA queue and cross-mkey
/// (spec.md §3 "Virtqueue").
pub struct Virtqueue {
    pub index: u16,
    ring_size: u16,
    max_tunnel_desc: u16,
    in_order_completions: bool,
    state: VqState,
    desc_pool: DescriptorPool,
    free_cmds: VecDeque<u16>,
    inflight_cmds: VecDeque<u16>,
    fatal_cmds: HashSet<u16>,
    commands: HashMap<u16, Command>,
    dma_queue: DmaQueue,
    cross_mkey: CrossMkey,
    fatal_queue: Arc<Mutex<VecDeque<u16>>>,
    rw_done_queue: Arc<Mutex<VecDeque<(u16, u32)>>>,
}

impl Virtqueue {
    pub fn new(
        index: u16,
        ring_size: u16,
        max_tunnel_desc: u16,
        in_order_completions: bool,
        dma_queue: DmaQueue,
        cross_mkey: CrossMkey,
    ) -> Self {
        Self {
            index,
            ring_size,
            max_tunnel_desc,
            in_order_completions,
            state: VqState::Running,
            desc_pool: DescriptorPool::new(ring_size),
            free_cmds: (0..ring_size).collect(),
            inflight_cmds: VecDeque::new(),
            fatal_cmds: HashSet::new(),
            commands: HashMap::new(),
            dma_queue,
            cross_mkey,
            fatal_queue: Arc::new(Mutex::new(VecDeque::new())),
            rw_done_queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn state(&self) -> VqState {
        self.state
    }

    pub fn ring_size(&self) -> u16 {
        self.ring_size
    }

    pub fn free_count(&self) -> usize {
        self.free_cmds.len()
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight_cmds.len()
    }

    pub fn fatal_count(&self) -> usize {
        self.fatal_cmds.len()
    }

    /// spec.md §8: `|free_cmds| + |inflight_cmds| + |fatal_cmds| = ring_size`.
    pub fn partition_invariant_holds(&self) -> bool {
        self.free_count() + self.inflight_count() + self.fatal_count() == self.ring_size as usize
    }

    pub fn command(&self, id: u16) -> Option<&Command> {
        self.commands.get(&id)
    }

    pub fn cross_rkey(&self) -> RKey {
        self.cross_mkey.rkey()
    }

    /// `suspend()` sets state to FLUSHING (spec.md §4.4 "Suspension").
    pub fn suspend(&mut self) {
        self.state = VqState::Flushing;
    }

    /// True only when `inflight_cmds` is empty and state is SUSPENDED
    /// (spec.md §4.4 "Suspension", §8 "For every virtqueue in state
    /// `SUSPENDED`: `inflight_cmds = ∅`").
    pub fn is_suspended(&self) -> bool {
        self.state == VqState::Suspended && self.inflight_cmds.is_empty()
    }

    pub fn resume(&mut self) -> Result<()> {
        if !self.is_suspended() {
            return Err(Error::StateMismatch {
                expected: "SUSPENDED",
                found: "other",
            });
        }
        self.state = VqState::Running;
        Ok(())
    }

    /// Performs the `FLUSHING → SUSPENDED` transition when the inflight
    /// list empties, drains completed DMA ops, and retires any command
    /// that failed its DMA into `fatal_cmds` (spec.md §4.4 "Suspension",
    /// "Fatal"). Returns the number of DMA completions delivered this tick.
    pub fn progress(&mut self) -> usize {
        let delivered = self.dma_queue.progress();

        let pending_rw_done: Vec<(u16, u32)> = {
            let mut q = self.rw_done_queue.lock().unwrap();
            q.drain(..).collect()
        };
        for (id, len) in pending_rw_done {
            if let Some(cmd) = self.commands.get_mut(&id) {
                cmd.consumed_len += len;
                cmd.pending_completion = false;
            }
        }

        let pending_fatal: Vec<u16> = {
            let mut q = self.fatal_queue.lock().unwrap();
            q.drain(..).collect()
        };
        for id in pending_fatal {
            if self.fatal_cmds.contains(&id) {
                continue;
            }
            if let Some(pos) = self.inflight_cmds.iter().position(|&x| x == id) {
                self.inflight_cmds.remove(pos);
            }
            self.commands.remove(&id);
            self.fatal_cmds.insert(id);
            log::warn!(target: "vnic_vqueue", "command {id} on vq {} moved to fatal_cmds", self.index);
        }

        if self.state == VqState::Flushing && self.inflight_cmds.is_empty() {
            self.state = VqState::Suspended;
            log::info!(target: "vnic_vqueue", "vq {} FLUSHING -> SUSPENDED", self.index);
        }
        delivered
    }

    /// A new command arrives via the DMA rx callback carrying a header
    /// `{desc_head_idx, num_descs, descs[...]}` (spec.md §4.4 "Descriptor
    /// fetch"). `fetch_next` simulates the continuation-descriptor DMA read
    /// at `desc_pa + next_idx * desc_size`, returning `None` on failure.
    pub fn fetch_command(
        &mut self,
        desc_head_idx: u16,
        mut chain: Vec<DescriptorEntry>,
        mut fetch_next: impl FnMut(u16) -> Option<DescriptorEntry>,
    ) -> Result<u16> {
        if self.state == VqState::Flushing {
            return Err(Error::StateMismatch {
                expected: "RUNNING",
                found: "FLUSHING",
            });
        }
        while chain.last().map(|d| d.has_next()).unwrap_or(false) {
            if chain.len() >= self.max_tunnel_desc as usize {
                return Err(Error::BadArgument(format!(
                    "descriptor chain exceeds max_tunnel_desc {}",
                    self.max_tunnel_desc
                )));
            }
            let next_idx = chain.last().unwrap().next;
            let next = fetch_next(next_idx)
                .ok_or_else(|| Error::DmaFailure("continuation descriptor fetch failed".into()))?;
            chain.push(next);
        }

        let pos = self
            .free_cmds
            .iter()
            .position(|&id| id == desc_head_idx)
            .ok_or(Error::Busy)?;
        self.desc_pool
            .draw(chain.len())
            .ok_or(Error::OutOfMemory)?;
        self.free_cmds.remove(pos);
        self.commands
            .insert(desc_head_idx, Command::new(desc_head_idx, chain));
        self.inflight_cmds.push_back(desc_head_idx);
        Ok(desc_head_idx)
    }

    /// Splits `local_buf` across `cmd`'s descriptor chain starting at
    /// `first_desc_idx`/`first_offset`, honouring per-descriptor lengths
    /// (spec.md §4.4 "Read/write chain"). Refused while a chain is already
    /// outstanding for this command (spec.md §3: "at most one outstanding
    /// DMA chain exists per command at a time"); on any DMA error the
    /// command is marked fatal via the shared fatal queue, drained on the
    /// next `progress()`, which also clears `pending_completion` and
    /// accumulates `consumed_len` for a successful chain.
    #[allow(clippy::too_many_arguments)]
    pub fn descs_rw(
        &mut self,
        cmd_id: u16,
        first_desc_idx: usize,
        first_offset: u32,
        local_buf: &mut [u8],
        lbuf_lkey: LKey,
        write: bool,
        done_cb: impl FnMut(bool) + Send + 'static,
    ) -> Result<()> {
        let cmd = self.commands.get(&cmd_id).ok_or(Error::NoDevice)?;
        if cmd.pending_completion {
            return Err(Error::Busy);
        }
        let descs = cmd.descs.clone();

        let mut pieces: Vec<(u64, usize, usize)> = Vec::new();
        let mut idx = first_desc_idx;
        let mut offset = first_offset;
        let mut buf_off = 0usize;
        let mut remaining = local_buf.len();
        while remaining > 0 {
            let d = descs
                .get(idx)
                .ok_or_else(|| Error::BadArgument("descriptor chain exhausted".into()))?;
            let avail = (d.len.saturating_sub(offset)) as usize;
            if avail == 0 {
                idx += 1;
                offset = 0;
                continue;
            }
            let take = avail.min(remaining);
            pieces.push((d.addr + offset as u64, take, buf_off));
            buf_off += take;
            remaining -= take;
            offset += take as u32;
            if offset >= d.len {
                idx += 1;
                offset = 0;
            }
        }

        let rkey = self.cross_rkey();
        let fatal_queue = self.fatal_queue.clone();
        let rw_done_queue = self.rw_done_queue.clone();
        let total_len = local_buf.len() as u32;
        let completion = chain_completion(
            pieces.len().max(1),
            move || fatal_queue.lock().unwrap().push_back(cmd_id),
            move |ok| {
                if ok {
                    rw_done_queue.lock().unwrap().push_back((cmd_id, total_len));
                }
                done_cb(ok);
            },
        );

        self.commands.get_mut(&cmd_id).unwrap().pending_completion = true;
        for (remote_addr, take, off) in pieces {
            let slice = &mut local_buf[off..off + take];
            if write {
                self.dma_queue
                    .write(slice, lbuf_lkey, remote_addr, rkey, completion.clone())?;
            } else {
                self.dma_queue
                    .read(slice, lbuf_lkey, remote_addr, rkey, completion.clone())?;
            }
        }
        Ok(())
    }

    /// Records the final status/length for a command once the protocol
    /// handler has finished with it; `cmd_complete` is what actually sends
    /// it over the wire.
    pub fn mark_done(&mut self, cmd_id: u16, status: u8, len: u32) -> Result<()> {
        let cmd = self.commands.get_mut(&cmd_id).ok_or(Error::NoDevice)?;
        cmd.done = Some(CommandOutcome { status, len });
        Ok(())
    }

    /// `cmd_complete(cmd)` sends a `{id, len}` message via the DMA queue's
    /// send-completion path. With `IN_ORDER_COMPLETIONS` the queue defers
    /// sending until all commands older than this one have completed,
    /// draining from the front of `inflight_cmds` (spec.md §4.4, §8
    /// "In-order completion").
    pub fn cmd_complete(&mut self, cmd_id: u16) -> Result<()> {
        {
            let cmd = self.commands.get(&cmd_id).ok_or(Error::NoDevice)?;
            if cmd.done.is_none() {
                return Err(Error::StateMismatch {
                    expected: "done outcome set",
                    found: "pending",
                });
            }
        }
        if !self.in_order_completions {
            return self.send_and_retire(cmd_id);
        }
        while let Some(&front_id) = self.inflight_cmds.front() {
            let ready = self
                .commands
                .get(&front_id)
                .map(|c| c.done.is_some())
                .unwrap_or(false);
            if !ready {
                break;
            }
            self.send_and_retire(front_id)?;
        }
        Ok(())
    }

    fn send_and_retire(&mut self, cmd_id: u16) -> Result<()> {
        let (outcome, desc_count) = {
            let cmd = self.commands.get(&cmd_id).ok_or(Error::NoDevice)?;
            (cmd.done.ok_or(Error::NoDevice)?, cmd.descs.len())
        };
        let mut msg = Vec::with_capacity(6);
        msg.extend_from_slice(&cmd_id.to_le_bytes());
        msg.extend_from_slice(&outcome.len.to_le_bytes());
        self.dma_queue.send_completion(&msg)?;

        if let Some(pos) = self.inflight_cmds.iter().position(|&id| id == cmd_id) {
            self.inflight_cmds.remove(pos);
        }
        self.commands.remove(&cmd_id);
        self.desc_pool.give_back(desc_count);
        self.free_cmds.push_back(cmd_id);
        Ok(())
    }

    pub fn sent_completions(&self) -> &[Vec<u8>] {
        self.dma_queue.sent_completions()
    }
}

#[cfg(test)]
mod virtqueue_tests;
