//! The command channel itself: typed create/modify/query/destroy against
//! firmware "general objects", plus the tunneled retry wrapper (spec.md
//! §4.1).
//!
//! [`CommandChannel`] is a trait, not a concrete transport, so that a real
//! firmware mailbox and the deterministic in-memory fake used by
//! `vnic-tests` share one call surface — the same seam the teacher's
//! `PciDriver`/`PciDeviceInfo` split uses to separate bus enumeration from a
//! specific driver.

use vnic_abi::{Error, Result, VhcaId};

use crate::opcode::{ObjectType, Opcode};
use crate::retry::RetryPolicy;

/// A transport capable of issuing single-round commands to firmware.
///
/// Implementations own the actual mailbox/doorbell mechanics; this trait
/// only describes the request/response shape the rest of the control plane
/// depends on. A non-zero firmware syndrome or a transport error is surfaced
/// as `Err(Error::CommandChannelFailure)`.
pub trait CommandChannel: Send + Sync {
    /// Single-round command on the context itself (no tunnel).
    fn general_cmd(&self, opcode: Opcode, input: &[u8], output: &mut [u8]) -> Result<()>;

    /// Single attempt of a tunneled command, embedding `tunnel` as the
    /// request's uid. Callers that want retries go through
    /// [`tunneled_cmd`], not this method directly.
    fn raw_tunneled_cmd(
        &self,
        opcode: Opcode,
        tunnel: VhcaId,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<()>;
}

/// Issue a command that may need to cross a tunnel to reach a non-manager
/// function (spec.md §4.1, §6 "Tunnel").
///
/// Retries with a fixed 50ms backoff up to the opcode's retry budget
/// (spec.md §4.1) before surfacing the last error. Fails immediately,
/// without consuming a retry, if the device has no tunnel handle and is not
/// required to have one under legacy mode (spec.md §3 "tunnel handle
/// (legacy mode only)").
pub fn tunneled_cmd(
    channel: &dyn CommandChannel,
    tunnel: Option<VhcaId>,
    tunnel_required: bool,
    opcode: Opcode,
    input: &[u8],
    output: &mut [u8],
) -> Result<()> {
    let tunnel_id = match tunnel {
        Some(id) => id,
        None if tunnel_required => return Err(Error::NoDevice),
        None => return channel.general_cmd(opcode, input, output),
    };

    let policy = RetryPolicy::for_opcode(opcode);
    let mut attempt = 0u32;
    loop {
        match channel.raw_tunneled_cmd(opcode, tunnel_id, input, output) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retry_eligible() && attempt < policy.max_retries => {
                attempt += 1;
                log::debug!(
                    target: "vnic_cmdchan",
                    "retrying {opcode:?} on tunnel {tunnel_id:?} (attempt {attempt}/{})",
                    policy.max_retries
                );
                std::thread::sleep(policy.backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Handle to a created firmware general object.
///
/// Holds the destroy request bytes captured at create time (spec.md §4.1,
/// §9 "destructor-buffer pattern"): the tunnel may be unusable by the time
/// the object needs destroying (device mid-FLR, channel gone fatal), so the
/// bytes to send are computed once, while the channel is known-good, and
/// carried for the handle's whole lifetime instead of being re-derived from
/// live device state at drop time.
#[derive(Clone)]
pub struct ObjectHandle {
    pub object_type: ObjectType,
    pub id: u32,
    tunnel: Option<VhcaId>,
    destroy_request: Vec<u8>,
}

impl ObjectHandle {
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// Create a general object of `object_type`.
///
/// `input` is the opaque creation request body. `make_destroy_request`
/// receives the decoded creation response bytes (which embed the firmware
/// object id) and must return the fully-encoded destroy request to use
/// later — this is where the destructor-buffer gets built.
pub fn object_create(
    channel: &dyn CommandChannel,
    tunnel: Option<VhcaId>,
    tunnel_required: bool,
    object_type: ObjectType,
    input: &[u8],
    output: &mut [u8],
    object_id: u32,
    make_destroy_request: impl FnOnce(&[u8]) -> Vec<u8>,
) -> Result<ObjectHandle> {
    tunneled_cmd(
        channel,
        tunnel,
        tunnel_required,
        Opcode::CreateGeneralObject,
        input,
        output,
    )?;
    let destroy_request = make_destroy_request(output);
    log::info!(
        target: "vnic_cmdchan",
        "created {object_type:?} id={object_id} (tunnel={tunnel:?})"
    );
    Ok(ObjectHandle {
        object_type,
        id: object_id,
        tunnel,
        destroy_request,
    })
}

pub fn object_modify(
    channel: &dyn CommandChannel,
    handle: &ObjectHandle,
    tunnel_required: bool,
    input: &[u8],
    output: &mut [u8],
) -> Result<()> {
    tunneled_cmd(
        channel,
        handle.tunnel,
        tunnel_required,
        Opcode::ModifyGeneralObject,
        input,
        output,
    )
}

pub fn object_query(
    channel: &dyn CommandChannel,
    handle: &ObjectHandle,
    tunnel_required: bool,
    input: &[u8],
    output: &mut [u8],
) -> Result<()> {
    tunneled_cmd(
        channel,
        handle.tunnel,
        tunnel_required,
        Opcode::QueryGeneralObject,
        input,
        output,
    )
}

/// Destroy a general object using the request bytes captured at create
/// time, so this always has something to send even over a channel that has
/// since degraded.
pub fn object_destroy(
    channel: &dyn CommandChannel,
    handle: &ObjectHandle,
    tunnel_required: bool,
) -> Result<()> {
    let mut output = [0u8; 0];
    let result = tunneled_cmd(
        channel,
        handle.tunnel,
        tunnel_required,
        Opcode::DestroyGeneralObject,
        &handle.destroy_request,
        &mut output,
    );
    if let Err(ref e) = result {
        log::warn!(
            target: "vnic_cmdchan",
            "destroy {:?} id={} failed: {e}", handle.object_type, handle.id
        );
    }
    result
}

#[cfg(test)]
mod channel_tests;
