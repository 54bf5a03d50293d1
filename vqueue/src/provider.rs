//! Pluggable queue providers (spec.md §4.4 "Provider plug-in").
//!
//! The queue holds a vtable with create/destroy/progress/query/modify; the
//! hardware provider creates a firmware queue object bound to a counters
//! object, the software provider runs an internal polling loop over host
//! memory, and the DPA provider delegates to co-processor code — out of
//! scope per spec.md §1 Non-goals beyond this trait seam. Provider
//! selection is per-controller config.

use vnic_abi::{Error, Result};
use vnic_cmdchan::{object_create, object_destroy, CommandChannel, ObjectHandle, ObjectType};

/// Parameters needed to stand up a hardware/software/DPA queue object.
pub struct VqCreateParams {
    pub ring_size: u16,
    pub msix_vector: u16,
    pub desc_pa: u64,
    pub driver_pa: u64,
    pub device_pa: u64,
}

/// Live state a provider reports back on `query`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VqProviderState {
    pub hw_avail_idx: u16,
    pub hw_used_idx: u16,
}

/// Fields a caller may update via `modify` (mirrors the BAR fields that are
/// allowed to change post-create, e.g. msix vector on migration restore).
#[derive(Clone, Copy, Debug, Default)]
pub struct VqModifyAttr {
    pub msix_vector: Option<u16>,
    pub hw_avail_idx: Option<u16>,
    pub hw_used_idx: Option<u16>,
}

/// create/destroy/progress/query/modify vtable for one queue-provider
/// implementation (spec.md §4.4 "Provider plug-in"; §9 "container-of
/// polymorphism").
pub trait VqProvider: Send + Sync {
    fn create(&mut self, channel: &dyn CommandChannel, params: &VqCreateParams) -> Result<()>;
    fn destroy(&mut self, channel: &dyn CommandChannel) -> Result<()>;
    /// Drives whatever polling this provider needs internally; returns the
    /// number of events it handled.
    fn progress(&mut self) -> usize;
    fn query(&self) -> Result<VqProviderState>;
    fn modify(&mut self, channel: &dyn CommandChannel, attr: &VqModifyAttr) -> Result<()>;
}

/// Hardware-offloaded provider: creates a firmware queue object bound to a
/// counters object (spec.md §4.4).
pub struct HardwareProvider {
    queue_object: Option<ObjectHandle>,
    counters_object: Option<ObjectHandle>,
    state: VqProviderState,
}

impl HardwareProvider {
    pub fn new() -> Self {
        Self {
            queue_object: None,
            counters_object: None,
            state: VqProviderState::default(),
        }
    }
}

impl Default for HardwareProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl VqProvider for HardwareProvider {
    fn create(&mut self, channel: &dyn CommandChannel, params: &VqCreateParams) -> Result<()> {
        let input = vec![0u8; 32];
        let mut output = vec![0u8; 32];
        let counters = object_create(
            channel,
            None,
            false,
            ObjectType::VirtioQCounters,
            &input,
            &mut output,
            1,
            |_resp| Vec::new(),
        )?;

        let mut q_input = vec![0u8; 48];
        q_input[..2].copy_from_slice(&params.ring_size.to_le_bytes());
        let mut q_output = vec![0u8; 48];
        let queue = object_create(
            channel,
            None,
            false,
            ObjectType::VirtioBlkQ,
            &q_input,
            &mut q_output,
            2,
            |_resp| Vec::new(),
        )?;

        self.counters_object = Some(counters);
        self.queue_object = Some(queue);
        Ok(())
    }

    fn destroy(&mut self, channel: &dyn CommandChannel) -> Result<()> {
        if let Some(q) = self.queue_object.take() {
            object_destroy(channel, &q, false)?;
        }
        if let Some(c) = self.counters_object.take() {
            object_destroy(channel, &c, false)?;
        }
        Ok(())
    }

    fn progress(&mut self) -> usize {
        // Hardware-offloaded: firmware advances indices itself, nothing to
        // poll here beyond `query`.
        0
    }

    fn query(&self) -> Result<VqProviderState> {
        Ok(self.state)
    }

    fn modify(&mut self, _channel: &dyn CommandChannel, attr: &VqModifyAttr) -> Result<()> {
        if let Some(idx) = attr.hw_avail_idx {
            self.state.hw_avail_idx = idx;
        }
        if let Some(idx) = attr.hw_used_idx {
            self.state.hw_used_idx = idx;
        }
        Ok(())
    }
}

/// The three internal phases of the software-polling provider's progress
/// loop (spec.md §4.4: "runs a three-state internal progress loop that
/// polls host memory for available-index changes and synthesises
/// descriptor headers").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SoftwarePhase {
    PollAvailIndex,
    SynthesizeHeader,
    Idle,
}

/// Software-polling provider: no firmware queue object, the control plane
/// itself watches `avail_idx` over host memory.
pub struct SoftwareProvider {
    phase: SoftwarePhase,
    state: VqProviderState,
    last_seen_avail: u16,
}

impl SoftwareProvider {
    pub fn new() -> Self {
        Self {
            phase: SoftwarePhase::PollAvailIndex,
            state: VqProviderState::default(),
            last_seen_avail: 0,
        }
    }

    /// Advance the three-phase loop once, given the host-reported avail
    /// index read this tick. Returns `true` if a new descriptor header was
    /// synthesised.
    pub fn tick(&mut self, observed_avail_idx: u16) -> bool {
        match self.phase {
            SoftwarePhase::PollAvailIndex => {
                if observed_avail_idx != self.last_seen_avail {
                    self.phase = SoftwarePhase::SynthesizeHeader;
                } else {
                    self.phase = SoftwarePhase::Idle;
                }
                false
            }
            SoftwarePhase::SynthesizeHeader => {
                self.state.hw_avail_idx = observed_avail_idx;
                self.last_seen_avail = observed_avail_idx;
                self.phase = SoftwarePhase::PollAvailIndex;
                true
            }
            SoftwarePhase::Idle => {
                self.phase = SoftwarePhase::PollAvailIndex;
                false
            }
        }
    }
}

impl Default for SoftwareProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl VqProvider for SoftwareProvider {
    fn create(&mut self, _channel: &dyn CommandChannel, _params: &VqCreateParams) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self, _channel: &dyn CommandChannel) -> Result<()> {
        Ok(())
    }

    fn progress(&mut self) -> usize {
        if self.tick(self.last_seen_avail) {
            1
        } else {
            0
        }
    }

    fn query(&self) -> Result<VqProviderState> {
        Ok(self.state)
    }

    fn modify(&mut self, _channel: &dyn CommandChannel, attr: &VqModifyAttr) -> Result<()> {
        if let Some(idx) = attr.hw_used_idx {
            self.state.hw_used_idx = idx;
        }
        Ok(())
    }
}

/// DPA (co-processor offload) provider. The co-processor program itself is
/// out of scope (spec.md §1 Non-goals: "the DPA offload variant (mentioned
/// only as a queue provider)"); this type only occupies the trait seam so
/// the controller's provider selection is exhaustive.
#[derive(Default)]
pub struct DpaProvider {
    state: VqProviderState,
}

impl VqProvider for DpaProvider {
    fn create(&mut self, _channel: &dyn CommandChannel, _params: &VqCreateParams) -> Result<()> {
        Err(Error::NotSupported(
            "DPA queue provider has no co-processor program loaded in this build".into(),
        ))
    }

    fn destroy(&mut self, _channel: &dyn CommandChannel) -> Result<()> {
        Ok(())
    }

    fn progress(&mut self) -> usize {
        0
    }

    fn query(&self) -> Result<VqProviderState> {
        Ok(self.state)
    }

    fn modify(&mut self, _channel: &dyn CommandChannel, _attr: &VqModifyAttr) -> Result<()> {
        Err(Error::NotSupported("DPA provider does not support modify".into()))
    }
}

#[cfg(test)]
mod provider_tests;
