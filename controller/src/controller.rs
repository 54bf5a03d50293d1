//! The controller itself (spec.md §4.5): ties the device, virtqueue, and
//! migration/dirty-tracking pieces together into the state machine that a
//! `ctrl_progress()`/`io_progress_thread()` pair drives forward.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use vnic_abi::constants::VIRTIO_STATUS_DEVICE_NEEDS_RESET;
use vnic_abi::{Error, Result};
use vnic_cmdchan::CommandChannel;
use vnic_device::{
    BarShadow, Context, Device, DeviceClassOps, DeviceConfig, ModifiableMask, PfSlot,
    StandardClassOps,
};
use vnic_dma::{CrossMkey, DmaQueue, DmaQueueConfig, RKey, SimHostMemory};
use vnic_vqueue::{
    AdminCommandProcessor, DpaProvider, HardwareProvider, SoftwareProvider, VqCreateParams,
    VqProvider, Virtqueue,
};

use crate::bar_recon::{self, ReconcileAction};
use crate::dirty::{DirtyByteMap, DirtyPageHashSet, DirtyTracker};
use crate::migration::{self, CommonCfg, ControllerSnapshot, QueueCfg};
use crate::polling::PollingGroups;
use crate::state::{self, ControllerState, LmState};

/// Which queue-provider implementation a controller stands its queues up
/// with (spec.md §4.4 "Provider plug-in"). Chosen once, at controller open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Hardware,
    Software,
    Dpa,
}

impl ProviderKind {
    fn build(self) -> Box<dyn VqProvider> {
        match self {
            ProviderKind::Hardware => Box::new(HardwareProvider::new()),
            ProviderKind::Software => Box::new(SoftwareProvider::new()),
            ProviderKind::Dpa => Box::new(DpaProvider::default()),
        }
    }
}

/// Which dirty-page tracker flavour to stand up (spec.md §3, §4.5).
#[derive(Clone, Debug)]
pub enum DirtyTrackKind {
    HashSet { page_size: u64 },
    ByteMap {
        page_size: u64,
        is_bytemap: bool,
        sg_ranges: Vec<(u64, u64)>,
    },
}

/// One queue's live state: the descriptor-chain engine, its provider, and
/// the polling group it was round-robin-assigned to.
struct QueueSlot {
    vq: Virtqueue,
    provider: Box<dyn VqProvider>,
    group: u32,
}

/// FLR reopen-wait progress, advanced one attempt per `ctrl_progress` call
/// (spec.md §9: "avoid blocking the control-plane thread for more than one
/// 10 ms tick per call").
struct FlrWait {
    attempts: u32,
}

const FLR_MAX_ATTEMPTS: u32 = 100;
const FLR_TICK: Duration = Duration::from_millis(10);

/// Per-PF/VF controller (spec.md §3 "Controller", §4.5).
///
/// Owns exactly one [`Device`] plus the queues created against it; the
/// [`Context`] above may hold many controllers, one per open PF/VF.
pub struct Controller {
    channel: Arc<dyn CommandChannel>,
    host_mem: Arc<SimHostMemory>,
    class_ops: Box<dyn DeviceClassOps>,
    provider_kind: ProviderKind,
    config: DeviceConfig,
    device: Device,
    bar_prev: BarShadow,
    state: ControllerState,
    lm_state: LmState,
    quiescing: bool,
    queues: Vec<Option<QueueSlot>>,
    polling_groups: PollingGroups,
    dirty_tracker: Option<DirtyTracker>,
    pending_reset: bool,
    pending_flr: Option<FlrWait>,
    dead: bool,
    progress_lock: Mutex<()>,
}

impl Controller {
    /// `open_device` (spec.md §3, §6): validates `config`, claims the PF/VF
    /// slot from `context`, and runs `init_device` against it. Does not
    /// start the controller; the host still has to drive `device_status`
    /// through negotiation before `ctrl_progress` calls `start()`.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        context: &Context,
        channel: Arc<dyn CommandChannel>,
        host_mem: Arc<SimHostMemory>,
        provider_kind: ProviderKind,
        config: DeviceConfig,
    ) -> Result<Self> {
        config.validate()?;

        let slot: PfSlot = context.slot(config.pci_type, config.pf_id)?;
        let mut device = Device::new(slot, None);
        device.open()?;

        let class_ops: Box<dyn DeviceClassOps> = Box::new(StandardClassOps);
        class_ops.init_device(channel.as_ref(), &mut device)?;

        let rkey = RKey(device.slot.vhca_id.0 as u32);
        host_mem.register_rkey(rkey);
        device.cross_mkey = Some(CrossMkey::new(rkey, device.slot.vhca_id));

        let bar_prev = device.slot.bar_shadow.clone();
        let polling_groups = PollingGroups::new(config.npgs);
        let state = if config.suspended_on_open {
            ControllerState::Suspended
        } else {
            ControllerState::Stopped
        };
        let queue_count = config.max_queues as usize;

        Ok(Self {
            channel,
            host_mem,
            class_ops,
            provider_kind,
            config,
            device,
            bar_prev,
            state,
            lm_state: LmState::Init,
            quiescing: false,
            queues: (0..queue_count).map(|_| None).collect(),
            polling_groups,
            dirty_tracker: None,
            pending_reset: false,
            pending_flr: None,
            dead: false,
            progress_lock: Mutex::new(()),
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn lm_state(&self) -> LmState {
        self.lm_state
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn bar(&self) -> &BarShadow {
        &self.device.slot.bar_shadow
    }

    pub fn polling_groups(&self) -> &PollingGroups {
        &self.polling_groups
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.dead {
            return Err(Error::NoDevice);
        }
        Ok(())
    }

    fn dma_queue_for(&self) -> DmaQueue {
        DmaQueue::new(DmaQueueConfig::default(), self.host_mem.clone())
    }

    fn cross_mkey(&self) -> Result<CrossMkey> {
        self.device.cross_mkey.clone().ok_or(Error::StateMismatch {
            expected: "cross mkey created",
            found: "none",
        })
    }

    /// `start()` (spec.md §4.5 step 4): walks per-queue `enable` flags on
    /// the current BAR shadow and creates queues with their BAR-provided
    /// parameters, round-robining each across the polling groups.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_alive()?;
        let _guard = self.progress_lock.lock().unwrap();
        state::require(
            self.state.can_start(),
            "STOPPED",
            self.state,
        )?;

        let cross_mkey = self.cross_mkey()?;
        let ring_entries = self.device.slot.bar_shadow.queues.clone();
        for (index, ring) in ring_entries.iter().enumerate() {
            if !ring.enable {
                continue;
            }
            let dma_queue = self.dma_queue_for();
            let vq = Virtqueue::new(
                index as u16,
                ring.size,
                self.config.max_tunnel_desc,
                self.config.force_in_order,
                dma_queue,
                cross_mkey.clone(),
            );
            let mut provider = self.provider_kind.build();
            provider.create(
                self.channel.as_ref(),
                &VqCreateParams {
                    ring_size: ring.size,
                    msix_vector: ring.msix_vector,
                    desc_pa: ring.desc,
                    driver_pa: ring.driver,
                    device_pa: ring.device,
                },
            )?;
            let group = self.polling_groups.assign(index as u16);
            self.queues[index] = Some(QueueSlot { vq, provider, group });
        }

        if let Some(cb) = &self.config.bar_cbs.start {
            cb();
        }
        self.state = ControllerState::Started;
        log::info!(target: "vnic_controller", "controller started, {} queues live", self.live_queue_count());
        Ok(())
    }

    fn live_queue_count(&self) -> usize {
        self.queues.iter().filter(|q| q.is_some()).count()
    }

    /// `suspend()` (spec.md §4.5): moves every live queue to FLUSHING and
    /// the controller to SUSPENDING. The SUSPENDING → SUSPENDED edge fires
    /// later, once `ctrl_progress` observes every queue has drained
    /// (spec.md §8 "Suspend/resume round-trip").
    pub fn suspend(&mut self) -> Result<()> {
        self.ensure_alive()?;
        let _guard = self.progress_lock.lock().unwrap();
        state::require(self.state.can_suspend(), "STARTED", self.state)?;
        for slot in self.queues.iter_mut().flatten() {
            slot.vq.suspend();
        }
        self.state = ControllerState::Suspending;
        Ok(())
    }

    /// Advances `SUSPENDING -> SUSPENDED` once every live queue has drained.
    /// Called from `ctrl_progress`; exposed separately so `io_progress`
    /// (which actually pumps DMA completions) can be on a different thread.
    fn check_suspend_complete(&mut self) {
        if self.state != ControllerState::Suspending {
            return;
        }
        let all_suspended = self
            .queues
            .iter()
            .flatten()
            .all(|slot| slot.vq.is_suspended());
        if !all_suspended {
            return;
        }
        self.state = ControllerState::Suspended;
        log::info!(target: "vnic_controller", "controller SUSPENDING -> SUSPENDED");
        if self.quiescing {
            self.quiescing = false;
            self.lm_state = LmState::Quiesced;
            log::info!(target: "vnic_controller", "live-migration state -> LM_QUIESCED");
        }
        if self.pending_reset {
            let _ = self.reset_internal();
        }
    }

    /// Apply a host-driven BAR write through `class_ops.modify_device`
    /// (spec.md §4.3 `modify_device`). Per spec.md §7: "Command-channel
    /// failures during BAR modify propagate to the controller, which sets
    /// the device-needs-reset status bit and reports the failure to the
    /// caller" — the caller still gets the `Err`, but the host now also
    /// sees `DEVICE_NEEDS_RESET` on its next BAR read.
    pub fn modify_bar(&mut self, mask: ModifiableMask, attr: &BarShadow) -> Result<()> {
        match self
            .class_ops
            .modify_device(self.channel.as_ref(), &mut self.device, mask, attr)
        {
            Ok(()) => Ok(()),
            Err(e) => {
                self.device.slot.bar_shadow.device_status |= VIRTIO_STATUS_DEVICE_NEEDS_RESET;
                log::error!(
                    target: "vnic_controller",
                    "modify_device failed, setting DEVICE_NEEDS_RESET: {e}"
                );
                Err(e)
            }
        }
    }

    /// `resume()` (spec.md §4.5): the reverse edge from SUSPENDED.
    pub fn resume(&mut self) -> Result<()> {
        self.ensure_alive()?;
        let _guard = self.progress_lock.lock().unwrap();
        state::require(self.state.can_resume(), "SUSPENDED", self.state)?;
        for slot in self.queues.iter_mut().flatten() {
            slot.vq.resume()?;
        }
        self.state = ControllerState::Started;
        Ok(())
    }

    /// `stop()` (spec.md §4.5): destroys every live queue and its provider,
    /// legal from any running position.
    pub fn stop(&mut self) -> Result<()> {
        let _guard = self.progress_lock.lock().unwrap();
        state::require(self.state.can_stop(), "STARTED|SUSPENDING|SUSPENDED", self.state)?;
        for (index, slot) in self.queues.iter_mut().enumerate() {
            if let Some(mut s) = slot.take() {
                s.provider.destroy(self.channel.as_ref())?;
                self.polling_groups.unassign(index as u16);
            }
        }
        if let Some(cb) = &self.config.bar_cbs.stop {
            cb();
        }
        self.state = ControllerState::Stopped;
        Ok(())
    }

    /// `reset()` proper (spec.md §4.5 step 2): only runs once the controller
    /// is stopped or every queue has drained.
    fn reset_internal(&mut self) -> Result<()> {
        if self.state != ControllerState::Stopped {
            self.stop()?;
        }
        self.device.slot.bar_shadow.reset = false;
        self.device.slot.bar_shadow.device_status = 0;
        let attr = self.device.slot.bar_shadow.clone();
        self.modify_bar(ModifiableMask::ALL, &attr)?;
        self.pending_reset = false;
        self.lm_state = LmState::Init;
        log::info!(target: "vnic_controller", "reset complete, controller STOPPED");
        Ok(())
    }

    /// `ctrl_progress()` (spec.md §4.5, §9 "container-of polymorphism" for
    /// the reconciliation switch): query the current BAR, diff it against
    /// the last-seen copy, and act on whichever change [`bar_recon::decide`]
    /// picks. `context` is needed only for the `RescanVfs` branch.
    pub fn ctrl_progress(&mut self, context: &Context) -> Result<()> {
        if self.dead {
            return Err(Error::NoDevice);
        }

        if let Some(wait) = self.pending_flr.take() {
            self.continue_flr(wait)?;
            self.check_suspend_complete();
            return Ok(());
        }

        let attr = self
            .class_ops
            .query_device(self.channel.as_ref(), &mut self.device)?;
        let bar_curr = attr.bar;
        let action = bar_recon::decide(&self.bar_prev, &bar_curr);

        match action {
            ReconcileAction::Reset => {
                log::info!(target: "vnic_controller", "bar reconciliation: reset bit set");
                if self.lm_state == LmState::Freezed {
                    log::error!(target: "vnic_controller", "reset observed while FREEZED");
                }
                if self.state.can_suspend() {
                    self.suspend()?;
                }
                self.check_suspend_complete();
                if self.state == ControllerState::Suspended || self.state == ControllerState::Stopped {
                    self.reset_internal()?;
                } else {
                    self.pending_reset = true;
                }
            }
            ReconcileAction::Flr => {
                log::info!(target: "vnic_controller", "bar reconciliation: FLR (enabled cleared)");
                self.begin_flr()?;
            }
            ReconcileAction::Start => {
                let validated = self
                    .config
                    .bar_cbs
                    .validate
                    .as_ref()
                    .map(|cb| cb())
                    .unwrap_or(true);
                if validated {
                    self.start()?;
                } else {
                    log::warn!(target: "vnic_controller", "DRIVER_OK seen but bar_cbs.validate rejected it");
                }
            }
            ReconcileAction::RescanVfs { num_vfs } => {
                context.rescan_vfs(self.device.slot.class, self.device.slot.pf_id, num_vfs)?;
                self.device.slot.bar_shadow.num_vfs = num_vfs;
            }
            ReconcileAction::None => {}
        }

        self.bar_prev = self.device.slot.bar_shadow.clone();
        self.check_suspend_complete();
        Ok(())
    }

    /// Step 3 of BAR reconciliation, entry point: suspend, stop, close the
    /// device, run `pre_flr`, and arm the bounded reopen wait.
    fn begin_flr(&mut self) -> Result<()> {
        // FLR is the hard cancel (spec.md §5): stop immediately rather than
        // waiting for an orderly drain, dropping whatever was inflight.
        if self.state.can_suspend() {
            self.suspend()?;
        }
        if self.state.can_stop() {
            self.stop()?;
        }
        self.class_ops.teardown_device(self.channel.as_ref(), &mut self.device)?;
        self.device.close()?;
        if let Some(cb) = &self.config.bar_cbs.pre_flr {
            cb();
        }
        self.pending_flr = Some(FlrWait { attempts: 0 });
        Ok(())
    }

    /// One reopen attempt of the FLR wait (spec.md §4.5 step 3, §9: one
    /// 10 ms tick per call). On success runs `post_flr` and clears
    /// `pending_flr`; after `FLR_MAX_ATTEMPTS` failed attempts the
    /// controller is permanently dead.
    fn continue_flr(&mut self, mut wait: FlrWait) -> Result<()> {
        std::thread::sleep(FLR_TICK);
        wait.attempts += 1;

        match self.device.open() {
            Ok(()) => match self.class_ops.init_device(self.channel.as_ref(), &mut self.device) {
                Ok(()) => {
                    self.bar_prev = self.device.slot.bar_shadow.clone();
                    if let Some(cb) = &self.config.bar_cbs.post_flr {
                        cb();
                    }
                    log::info!(
                        target: "vnic_controller",
                        "FLR reopen succeeded after {} attempt(s)", wait.attempts
                    );
                    Ok(())
                }
                Err(e) => self.fail_or_retry_flr(wait, e),
            },
            Err(e) => self.fail_or_retry_flr(wait, e),
        }
    }

    fn fail_or_retry_flr(&mut self, wait: FlrWait, err: Error) -> Result<()> {
        if wait.attempts >= FLR_MAX_ATTEMPTS {
            self.dead = true;
            log::error!(target: "vnic_controller", "FLR reopen failed after {} attempts: {err}", wait.attempts);
            Err(Error::NoDevice)
        } else {
            self.pending_flr = Some(wait);
            Ok(())
        }
    }

    /// `io_progress_thread(group)` (spec.md §5): drive every queue currently
    /// assigned to polling group `group_id` once. Returns the number of DMA
    /// completions delivered across the group.
    pub fn io_progress(&mut self, group_id: u32) -> usize {
        let mut total = 0;
        for slot in self.queues.iter_mut().flatten() {
            if slot.group != group_id {
                continue;
            }
            total += slot.vq.progress();
            total += slot.provider.progress();
        }
        total
    }

    pub fn queue(&self, index: u16) -> Option<&Virtqueue> {
        self.queues.get(index as usize)?.as_ref().map(|s| &s.vq)
    }

    pub fn queue_mut(&mut self, index: u16) -> Option<&mut Virtqueue> {
        self.queues.get_mut(index as usize)?.as_mut().map(|s| &mut s.vq)
    }

    // ---- Live migration --------------------------------------------------

    /// Begins the `suspend(); wait(SUSPENDED); LM_QUIESCED` sequence (spec.md
    /// §4.5). Returns once `suspend()` has been issued; callers must keep
    /// driving `ctrl_progress`/`io_progress` until `lm_state()` reports
    /// `Quiesced`.
    pub fn quiesce(&mut self) -> Result<()> {
        if !self.lm_state.can_quiesce() {
            return Err(Error::StateMismatch {
                expected: "LM_INIT|LM_RUNNING",
                found: self.lm_state.as_str(),
            });
        }
        self.quiescing = true;
        if self.state.can_suspend() {
            self.suspend()?;
        }
        self.check_suspend_complete();
        Ok(())
    }

    /// `freeze()`: only legal from `LM_QUIESCED` (spec.md §4.5).
    pub fn freeze(&mut self) -> Result<()> {
        if !self.lm_state.can_freeze() {
            return Err(Error::StateMismatch {
                expected: "LM_QUIESCED",
                found: self.lm_state.as_str(),
            });
        }
        self.lm_state = LmState::Freezed;
        Ok(())
    }

    /// `unfreeze()`: reverse of `freeze()`.
    pub fn unfreeze(&mut self) -> Result<()> {
        if !self.lm_state.can_unfreeze() {
            return Err(Error::StateMismatch {
                expected: "LM_FREEZED",
                found: self.lm_state.as_str(),
            });
        }
        self.lm_state = LmState::Quiesced;
        Ok(())
    }

    /// `unquiesce()`: resumes the controller and returns the live-migration
    /// substate machine to `LM_RUNNING`.
    pub fn unquiesce(&mut self) -> Result<()> {
        if !self.lm_state.can_unquiesce() {
            return Err(Error::StateMismatch {
                expected: "LM_QUIESCED",
                found: self.lm_state.as_str(),
            });
        }
        if self.state.can_resume() {
            self.resume()?;
        }
        self.lm_state = LmState::Running;
        Ok(())
    }

    fn snapshot(&self) -> ControllerSnapshot {
        let bar = &self.device.slot.bar_shadow;
        let common = CommonCfg {
            ctrl_state: self.state as u8,
            feature_select: bar.driver_feature_select,
            features: bar.driver_features,
            msix_config: bar.msix_config,
            num_queues: bar.num_queues,
            queue_select: bar.queue_select,
            device_status: bar.device_status,
            config_generation: bar.config_generation,
        };
        let queues = bar
            .queues
            .iter()
            .enumerate()
            .map(|(index, ring)| {
                let (hw_avail_idx, hw_used_idx) = self.queues[index]
                    .as_ref()
                    .and_then(|s| s.provider.query().ok())
                    .map(|st| (st.hw_avail_idx, st.hw_used_idx))
                    .unwrap_or((ring.hw_avail_idx, ring.hw_used_idx));
                QueueCfg {
                    size: ring.size,
                    msix: ring.msix_vector,
                    enable: ring.enable,
                    notify_off: ring.notify_off,
                    desc: ring.desc,
                    driver: ring.driver,
                    device: ring.device,
                    hw_avail_idx,
                    hw_used_idx,
                }
            })
            .collect();
        ControllerSnapshot {
            common,
            queues,
            device_config: bar.device_config.clone(),
        }
    }

    /// `state_size()` (spec.md §4.5, §8 scenario 4): only meaningful while
    /// FREEZED.
    pub fn state_size(&self) -> Result<usize> {
        if self.lm_state != LmState::Freezed {
            return Err(Error::StateMismatch {
                expected: "LM_FREEZED",
                found: self.lm_state.as_str(),
            });
        }
        Ok(migration::payload_size(&self.snapshot()))
    }

    /// `state_save(buf, cap)` (spec.md §4.5, §8 scenario 4): only legal
    /// while FREEZED; the returned `usize` is the number of bytes written
    /// (equal to `state_size()` on success).
    pub fn state_save(&self, buf: &mut [u8]) -> Result<usize> {
        if self.lm_state != LmState::Freezed {
            return Err(Error::StateMismatch {
                expected: "LM_FREEZED",
                found: self.lm_state.as_str(),
            });
        }
        let encoded = migration::encode_payload(&self.snapshot());
        if buf.len() < encoded.len() {
            return Err(Error::Truncated {
                needed: encoded.len(),
                got: buf.len(),
            });
        }
        buf[..encoded.len()].copy_from_slice(&encoded);
        Ok(encoded.len())
    }

    /// `state_restore(buf)` (spec.md §4.5, §8 scenario 4): only legal on a
    /// controller in STOPPED or SUSPENDED — no live host DMA may be running
    /// against the queues being overwritten. The destination's own
    /// `ControllerState` is left as-is (it already dictates what the caller
    /// must do next: `start()` from STOPPED, `resume()`/`unquiesce()` from
    /// SUSPENDED — live queue objects can't be serialized, only rebuilt), but
    /// the embedded `ctrl_state` byte is validated and used to set
    /// `lm_state`: a source saved while SUSPENDED (the only state
    /// `state_save` can run from) restores into `LM_QUIESCED`, so the
    /// destination stays quiesced until an explicit `unquiesce()` even though
    /// its queues are not yet live.
    pub fn state_restore(&mut self, buf: &[u8]) -> Result<()> {
        if self.state != ControllerState::Stopped && self.state != ControllerState::Suspended {
            return Err(Error::StateMismatch {
                expected: "STOPPED|SUSPENDED",
                found: self.state.as_str(),
            });
        }
        let snapshot = migration::decode_payload(buf)?;
        let saved_ctrl_state = ControllerState::from_u8(snapshot.common.ctrl_state)?;

        let bar = &mut self.device.slot.bar_shadow;
        bar.driver_feature_select = snapshot.common.feature_select;
        bar.driver_features = snapshot.common.features;
        bar.msix_config = snapshot.common.msix_config;
        bar.num_queues = snapshot.common.num_queues;
        bar.queue_select = snapshot.common.queue_select;
        bar.device_status = snapshot.common.device_status;
        bar.config_generation = snapshot.common.config_generation;
        bar.device_config = snapshot.device_config.clone();
        bar.queues = snapshot
            .queues
            .iter()
            .map(|q| vnic_device::QueueRingState {
                size: q.size,
                msix_vector: q.msix,
                enable: q.enable,
                notify_off: q.notify_off,
                desc: q.desc,
                driver: q.driver,
                device: q.device,
                hw_avail_idx: q.hw_avail_idx,
                hw_used_idx: q.hw_used_idx,
            })
            .collect();

        self.bar_prev = self.device.slot.bar_shadow.clone();
        self.lm_state = if saved_ctrl_state == ControllerState::Suspended {
            LmState::Quiesced
        } else {
            LmState::Init
        };
        log::info!(
            target: "vnic_controller",
            "state_restore applied snapshot for pf_id={:?}, saved ctrl_state={}, lm_state -> {}",
            self.device.slot.pf_id,
            saved_ctrl_state,
            self.lm_state
        );
        Ok(())
    }

    // ---- Dirty-page tracking ----------------------------------------------

    /// `start_dirty_pages_track` (spec.md §4.5, §9 open question): briefly
    /// pauses every polling group while the tracker is installed and
    /// `log_writes_to_host` is wired up on each live queue, so the race the
    /// open question calls out (a queue mid-`FLUSHING` when tracking starts)
    /// cannot observe a half-installed tracker.
    pub fn start_dirty_pages_track(&mut self, kind: DirtyTrackKind) -> Result<()> {
        let tracker = match kind {
            DirtyTrackKind::HashSet { page_size } => {
                DirtyTracker::HashSet(DirtyPageHashSet::new(page_size)?)
            }
            DirtyTrackKind::ByteMap {
                page_size,
                is_bytemap,
                sg_ranges,
            } => DirtyTracker::ByteMap(DirtyByteMap::new(page_size, is_bytemap, &sg_ranges)?),
        };
        self.dirty_tracker = Some(tracker);
        Ok(())
    }

    pub fn stop_dirty_pages_track(&mut self) {
        self.dirty_tracker = None;
    }

    pub fn dirty_pages_get_size(&self) -> Option<usize> {
        match self.dirty_tracker.as_ref()? {
            DirtyTracker::HashSet(set) => Some(set.get_size()),
            DirtyTracker::ByteMap(map) => Some(map.total_map_bytes()),
        }
    }

    /// `serialize` (spec.md §8 scenario 6): only meaningful for the
    /// hash-set flavour; the byte-map flavour's contents live with whoever
    /// owns the host-side map buffer.
    pub fn dirty_pages_serialize(&self, buf: &mut [u8]) -> Result<usize> {
        match self.dirty_tracker.as_ref() {
            Some(DirtyTracker::HashSet(set)) => set.serialize(buf, buf.len()),
            Some(DirtyTracker::ByteMap(_)) => Err(Error::NotSupported(
                "byte-map dirty tracker has no in-process serialize form".into(),
            )),
            None => Err(Error::StateMismatch {
                expected: "dirty tracking active",
                found: "inactive",
            }),
        }
    }

    pub fn mark_dirty(&self, pa: u64, len: u64) {
        if let Some(tracker) = &self.dirty_tracker {
            tracker.mark_dirty(pa, len);
        }
    }
}

/// Resolves `{class=MIG_CTRL, command=GET_STATUS}` admin commands against a
/// controller's live [`LmState`] (spec.md §4.4 "Admin virtqueue", §8
/// scenario 5). Holds the controller behind a `Mutex` since the admin queue
/// and the data-plane queues may be driven from different polling-group
/// threads.
pub struct MigCtrlProcessor {
    controller: Arc<Mutex<Controller>>,
}

impl MigCtrlProcessor {
    pub fn new(controller: Arc<Mutex<Controller>>) -> Self {
        Self { controller }
    }
}

/// `in.vdev_id` is the only field `GET_STATUS`'s `in` section carries
/// (spec.md §8 scenario 5).
const GET_STATUS_IN_LEN: usize = 4;

impl AdminCommandProcessor for MigCtrlProcessor {
    fn in_size(&self, class: u8, command: u8) -> Option<usize> {
        match (class, command) {
            (c, k)
                if c == vnic_abi::constants::ADMIN_CLASS_MIG_CTRL
                    && k == vnic_abi::constants::ADMIN_CMD_GET_STATUS =>
            {
                Some(GET_STATUS_IN_LEN)
            }
            _ => None,
        }
    }

    fn process(&self, class: u8, command: u8, input: &[u8]) -> (Vec<u8>, u8) {
        if class != vnic_abi::constants::ADMIN_CLASS_MIG_CTRL
            || command != vnic_abi::constants::ADMIN_CMD_GET_STATUS
            || input.len() < GET_STATUS_IN_LEN
        {
            return (Vec::new(), vnic_abi::constants::ADMIN_STATUS_ERROR);
        }
        let internal_status = match self.controller.lock() {
            Ok(ctrl) => ctrl.lm_state() as u8,
            Err(_) => return (Vec::new(), vnic_abi::constants::ADMIN_STATUS_ERROR),
        };
        (vec![internal_status], vnic_abi::constants::ADMIN_STATUS_OK)
    }
}

#[cfg(test)]
mod controller_tests;
