//! Admin virtqueue (spec.md §4.4 "Admin virtqueue (specialised block
//! queue)").
//!
//! Same skeleton as the data-plane [`crate::Virtqueue`], but the
//! per-command layout is `{header, union(in), union(out), footer{status}}`:
//! the queue fetches the header, then the `in` section (whose size is
//! derived from `(class, command)`), dispatches to a controller-registered
//! [`AdminCommandProcessor`], and on completion writes `out` and the status
//! footer back to the first writable descriptor(s) on the chain.

use vnic_abi::{Error, Result};
use vnic_dma::LKey;

use crate::virtqueue::Virtqueue;

/// Fixed 4-byte header preceding every admin command's `in` section:
/// `{class: u8, command: u8, reserved: u16}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdminCommandHeader {
    pub class: u8,
    pub command: u8,
}

pub const ADMIN_HEADER_LEN: usize = 4;

impl AdminCommandHeader {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ADMIN_HEADER_LEN {
            return Err(Error::Truncated {
                needed: ADMIN_HEADER_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self {
            class: bytes[0],
            command: bytes[1],
        })
    }

    pub fn encode(&self) -> [u8; ADMIN_HEADER_LEN] {
        [self.class, self.command, 0, 0]
    }
}

/// One in-flight admin command: header, decoded `in` bytes, and (once
/// dispatched) the processor's `out` bytes and status.
#[derive(Clone, Debug)]
pub struct AdminCommand {
    pub id: u16,
    pub header: AdminCommandHeader,
    pub input: Vec<u8>,
}

/// Dispatch target the controller registers for admin commands (spec.md
/// §4.4: "dispatches to a controller-registered processor").
pub trait AdminCommandProcessor: Send + Sync {
    /// Size in bytes of the `in` section for `(class, command)`, so the
    /// admin queue knows how much to fetch before dispatching. `None` means
    /// this `(class, command)` pair is unrecognised.
    fn in_size(&self, class: u8, command: u8) -> Option<usize>;

    /// Process a fully-fetched command, returning the `out` section bytes
    /// and the footer status (`ADMIN_STATUS_OK` on success).
    fn process(&self, class: u8, command: u8, input: &[u8]) -> (Vec<u8>, u8);
}

/// The admin virtqueue itself: wraps a [`Virtqueue`] and adds the
/// header/in/out/footer command shape on top of the generic descriptor-chain
/// engine.
pub struct AdminQueue {
    vq: Virtqueue,
    lkey: LKey,
}

impl AdminQueue {
    pub fn new(vq: Virtqueue, lkey: LKey) -> Self {
        Self { vq, lkey }
    }

    pub fn inner(&self) -> &Virtqueue {
        &self.vq
    }

    pub fn inner_mut(&mut self) -> &mut Virtqueue {
        &mut self.vq
    }

    /// Fetch the header and `in` section for a command already admitted to
    /// the underlying virtqueue (via [`Virtqueue::fetch_command`]), then
    /// dispatch to `processor` and write the response back.
    ///
    /// Byte-offsets address the first readable descriptor for the header/in
    /// section and the first writable descriptor for out/footer, per
    /// spec.md §4.4 "Edge-case policies".
    pub fn process_command(
        &mut self,
        cmd_id: u16,
        processor: &dyn AdminCommandProcessor,
    ) -> Result<()> {
        let first_readable = self
            .vq
            .command(cmd_id)
            .and_then(|c| c.first_readable())
            .ok_or_else(|| Error::BadArgument("admin command has no readable descriptor".into()))?;

        let mut header_buf = vec![0u8; ADMIN_HEADER_LEN];
        self.read_sync(cmd_id, first_readable, 0, &mut header_buf)?;
        let header = AdminCommandHeader::decode(&header_buf)?;

        let in_len = processor
            .in_size(header.class, header.command)
            .ok_or_else(|| {
                Error::BadArgument(format!(
                    "unrecognised admin command class={} command={}",
                    header.class, header.command
                ))
            })?;
        let mut input = vec![0u8; in_len];
        if in_len > 0 {
            self.read_sync(cmd_id, first_readable, ADMIN_HEADER_LEN as u32, &mut input)?;
        }

        let (out, status) = processor.process(header.class, header.command, &input);

        let first_writable = self
            .vq
            .command(cmd_id)
            .and_then(|c| c.first_writable())
            .ok_or_else(|| Error::BadArgument("admin command has no writable descriptor".into()))?;

        let mut response = out;
        response.push(status);
        if !response.is_empty() {
            self.write_sync(cmd_id, first_writable, 0, &mut response)?;
        }

        let total_len = (ADMIN_HEADER_LEN + in_len + response.len()) as u32;
        self.vq.mark_done(cmd_id, status, total_len)?;
        self.vq.cmd_complete(cmd_id)
    }

    /// The simulated DMA backend completes `read`/`write` synchronously
    /// (only completion *delivery* is deferred); `progress()` right after
    /// issuing the op observes that completion immediately, matching the
    /// pattern the data-plane tests use for `descs_rw`.
    fn read_sync(&mut self, cmd_id: u16, desc_idx: usize, offset: u32, buf: &mut [u8]) -> Result<()> {
        let lkey = self.lkey;
        self.vq
            .descs_rw(cmd_id, desc_idx, offset, buf, lkey, false, |_| {})?;
        self.vq.progress();
        Ok(())
    }

    fn write_sync(&mut self, cmd_id: u16, desc_idx: usize, offset: u32, buf: &mut [u8]) -> Result<()> {
        let lkey = self.lkey;
        self.vq
            .descs_rw(cmd_id, desc_idx, offset, buf, lkey, true, |_| {})?;
        self.vq.progress();
        Ok(())
    }
}

#[cfg(test)]
mod admin_tests;
