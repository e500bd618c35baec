// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        binding::Bindings,
        config::MvmConfig,
        device::{RateControl, RxHandler, StackEvents, Transport},
        error::Error,
        fw_api::{CommandId, HostCommand, Packet, QuotaCmd},
        mac_ctxt::{vif_slots, QueuePool, Vif},
        mcast::McastFilter,
        notif_wait::NotifWait,
        phy_ctxt::PhyContextPool,
        refs::{RefCounter, RefType},
        scan::ScanStatus,
        sta::{Station, StationTable},
        status::{Status, StatusFlags},
        time_event::TimeEventTable,
        types::{StaId, TxFrame, VifId, VifType, OFFCHANNEL_QUEUE},
    },
    futures::channel::mpsc,
    log::{debug, error, info, warn},
    parking_lot::Mutex,
    std::{
        collections::VecDeque,
        sync::{Arc, Weak},
    },
};

/// Work deferred out of the receive path. Runs under the device mutex.
pub(crate) enum AsyncWork {
    Notification(Packet),
    /// Remain-on-channel ended: flush the off-channel queue, then drop the reference.
    RocDone(Option<RefType>),
}

/// Frames held back while the firmware sits in its low-power state.
struct DeferredTx {
    ap_sta_id: Option<StaId>,
    frames: VecDeque<TxFrame>,
}

/// Everything serialized by the device mutex.
pub(crate) struct MvmState {
    pub(crate) vifs: Vec<Option<Vif>>,
    pub(crate) phy_ctxts: PhyContextPool,
    pub(crate) bindings: Bindings,
    pub(crate) scan_status: ScanStatus,
    pub(crate) mcast_filter: McastFilter,
    /// The single interface allowed to use beacon filtering.
    pub(crate) bf_allowed_vif: Option<VifId>,
    pub(crate) p2p_device_vif: Option<VifId>,
    pub(crate) csa_vif: Option<VifId>,
    /// Interfaces other than the P2P device.
    pub(crate) vif_count: u32,
    pub(crate) rx_ba_sessions: u32,
    pub(crate) rts_threshold: u32,
    pub(crate) last_quota_cmd: Option<QuotaCmd>,
    pub(crate) last_ebs_successful: bool,
    pub(crate) aux_sta: Option<StaId>,
    /// Bitmap of hardware key offsets in use.
    pub(crate) fw_key_table: u16,
    /// Power save is off device-wide while a monitor interface is active.
    pub(crate) ps_disabled: bool,
}

impl MvmState {
    fn new() -> Self {
        Self {
            vifs: vif_slots(),
            phy_ctxts: PhyContextPool::new(),
            bindings: Bindings::new(),
            scan_status: ScanStatus::None,
            mcast_filter: McastFilter::default(),
            bf_allowed_vif: None,
            p2p_device_vif: None,
            csa_vif: None,
            vif_count: 0,
            rx_ba_sessions: 0,
            rts_threshold: 0,
            last_quota_cmd: None,
            last_ebs_successful: true,
            aux_sta: None,
            fw_key_table: 0,
            ps_disabled: false,
        }
    }

    pub(crate) fn vif(&self, id: VifId) -> Result<&Vif, Error> {
        self.vifs
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .ok_or(Error::InvalidArgument("interface"))
    }

    pub(crate) fn vif_mut(&mut self, id: VifId) -> Result<&mut Vif, Error> {
        self.vifs
            .get_mut(id.index())
            .and_then(|slot| slot.as_mut())
            .ok_or(Error::InvalidArgument("interface"))
    }

    pub(crate) fn vifs(&self) -> impl Iterator<Item = &Vif> {
        self.vifs.iter().filter_map(|slot| slot.as_ref())
    }
}

/// The MAC-layer core of one device.
///
/// Lock order: `state` first, then any of the inner locks (time events, stations, queues,
/// references, status, notification waiters). No command is sent while the time event lock or a
/// station lock is held, and the async worker must be run without `state` held.
pub struct Mvm {
    pub(crate) config: MvmConfig,
    pub(crate) trans: Arc<dyn Transport>,
    pub(crate) rate_ctrl: Arc<dyn RateControl>,
    pub(crate) stack: Arc<dyn StackEvents>,
    pub(crate) status: Arc<Status>,
    pub(crate) refs: RefCounter,
    pub(crate) notif_wait: NotifWait,
    pub(crate) time_events: Arc<Mutex<TimeEventTable>>,
    pub(crate) stations: StationTable,
    pub(crate) queues: Mutex<QueuePool>,
    async_tx: mpsc::UnboundedSender<AsyncWork>,
    async_rx: Mutex<mpsc::UnboundedReceiver<AsyncWork>>,
    d0i3_tx: Mutex<DeferredTx>,
    pub(crate) state: Mutex<MvmState>,
}

impl Mvm {
    /// Creates the core and attaches it to the transport's receive path. The firmware starts out
    /// down.
    pub fn new(
        config: MvmConfig,
        trans: Arc<dyn Transport>,
        rate_ctrl: Arc<dyn RateControl>,
        stack: Arc<dyn StackEvents>,
    ) -> Arc<Self> {
        let status = Arc::new(Status::new(StatusFlags::FIRMWARE_DOWN));
        let refs = RefCounter::new(Arc::clone(&trans), Arc::clone(&status), &config);
        // Held whenever no firmware is running.
        refs.acquire(RefType::UcodeDown);
        let (async_tx, async_rx) = mpsc::unbounded();
        let mvm = Arc::new(Self {
            config,
            trans,
            rate_ctrl,
            stack,
            status,
            refs,
            notif_wait: NotifWait::new(),
            time_events: Arc::new(Mutex::new(TimeEventTable::new())),
            stations: StationTable::new(),
            queues: Mutex::new(QueuePool::new()),
            async_tx,
            async_rx: Mutex::new(async_rx),
            d0i3_tx: Mutex::new(DeferredTx { ap_sta_id: None, frames: VecDeque::new() }),
            state: Mutex::new(MvmState::new()),
        });
        let weak = Arc::downgrade(&mvm);
        let handler: Weak<dyn RxHandler> = weak;
        mvm.trans.attach_rx_handler(handler);
        mvm
    }

    pub fn config(&self) -> &MvmConfig {
        &self.config
    }

    pub fn status(&self) -> StatusFlags {
        self.status.get()
    }

    /// Sends a command and waits for its response. A non-zero firmware status is an error.
    pub(crate) fn send_cmd(&self, cmd: HostCommand) -> Result<Packet, Error> {
        let id = cmd.id();
        let resp = self.trans.send_command(&cmd)?;
        match resp.status() {
            0 => Ok(resp),
            status => {
                error!("firmware rejected {:?}: status {:#x}", id, status);
                Err(Error::FirmwareRejected { cmd: id, status })
            }
        }
    }

    pub(crate) fn send_cmd_async(&self, cmd: HostCommand) -> Result<(), Error> {
        self.trans.send_command_async(&cmd)?;
        Ok(())
    }

    pub(crate) fn queue_async(&self, work: AsyncWork) {
        if let Err(e) = self.async_tx.unbounded_send(work) {
            // The receiver lives as long as `self`.
            error!("async worker gone: {}", e);
        }
    }

    fn next_async(&self) -> Option<AsyncWork> {
        match self.async_rx.lock().try_next() {
            Ok(Some(work)) => Some(work),
            _ => None,
        }
    }

    /// Runs deferred receive-path work until the queue is empty. Must not be called with the
    /// device mutex held.
    pub fn process_async_handlers(&self) {
        while let Some(work) = self.next_async() {
            match work {
                AsyncWork::Notification(pkt) => match pkt.cmd {
                    CommandId::ScanCompleteNotification => self.rx_scan_complete(&pkt),
                    CommandId::ScanOffloadCompleteNotification => self.rx_sched_scan_complete(),
                    other => debug!("no async handler for {:?}", other),
                },
                AsyncWork::RocDone(roc_ref) => self.roc_done(roc_ref),
            }
        }
    }

    fn purge_async_handlers(&self) {
        while let Some(work) = self.next_async() {
            if let AsyncWork::RocDone(Some(roc_ref)) = work {
                self.refs.release(roc_ref);
            }
        }
    }

    fn roc_done(&self, roc_ref: Option<RefType>) {
        {
            let _st = self.state.lock();
            // Frames queued for the off-channel period must not go out on the operating channel.
            if let Err(e) = self.trans.flush_tx_path(1 << OFFCHANNEL_QUEUE) {
                error!("failed to flush the off-channel queue: {}", e);
            }
        }
        if let Some(roc_ref) = roc_ref {
            self.refs.release(roc_ref);
        }
    }

    /// Enters the firmware low-power state. Frames for the associated AP station are held back
    /// until `exit_d0i3`.
    pub fn enter_d0i3(&self) -> Result<(), Error> {
        if !self.config.d0i3_supported {
            return Err(Error::NotSupported("low-power state"));
        }
        let st = self.state.lock();
        let held = self.refs.total();
        if held > 0 {
            debug!("{} references held, staying awake", held);
            return Err(Error::Busy("device references"));
        }
        let ap_sta_id = st
            .vifs()
            .find(|v| v.vif_type == VifType::Station && v.associated)
            .and_then(|v| v.ap_sta_id);
        self.d0i3_tx.lock().ap_sta_id = ap_sta_id;
        self.status.set(StatusFlags::IN_D0I3);
        info!("entered low-power state");
        Ok(())
    }

    /// Leaves the low-power state, replays the held frames in order and wakes the queues.
    pub fn exit_d0i3(&self) {
        {
            let mut deferred = self.d0i3_tx.lock();
            let ap_sta_id = deferred.ap_sta_id.take();
            while let Some(frame) = deferred.frames.pop_front() {
                if let Err(e) = self.trans.tx_frame(ap_sta_id, &frame) {
                    warn!("dropping deferred frame: {}", e);
                }
            }
            self.status.clear(StatusFlags::IN_D0I3);
        }
        info!("left low-power state");
        self.stack.wake_queues();
    }

    /// Holds `frame` back if the device is in its low-power state and the frame targets the AP
    /// station. Returns whether the frame was taken.
    pub(crate) fn defer_tx(&self, sta: &Station, frame: &TxFrame) -> bool {
        if !self.status.test(StatusFlags::IN_D0I3) {
            return false;
        }
        {
            let mut deferred = self.d0i3_tx.lock();
            if !self.status.test(StatusFlags::IN_D0I3) || deferred.ap_sta_id != Some(sta.sta_id) {
                return false;
            }
            deferred.frames.push_back(frame.clone());
        }
        self.stack.stop_queues();
        // Taking a reference is what wakes the device up.
        self.refs.acquire(RefType::Tx);
        self.refs.release(RefType::Tx);
        true
    }

    /// Stops holding frames for a station that is going away.
    pub(crate) fn forget_d0i3_ap_sta(&self, sta_id: StaId) {
        let mut deferred = self.d0i3_tx.lock();
        if deferred.ap_sta_id == Some(sta_id) {
            deferred.ap_sta_id = None;
        }
    }

    /// Gives up on local recovery and asks the upper stack to restart the hardware.
    pub fn nic_restart(&self) {
        if self.status.test(StatusFlags::IN_HW_RESTART) {
            warn!("hardware restart already in progress");
            return;
        }
        error!("restarting hardware");
        self.status.set(StatusFlags::IN_HW_RESTART);
        // Keeps the device awake until the restart completes.
        self.refs.acquire(RefType::UcodeDown);
        self.stack.restart_hw();
    }

    /// Drops all state the dead firmware owned, ahead of reloading it.
    pub(crate) fn restart_cleanup(&self, st: &mut MvmState) {
        info!("cleaning up state for hardware restart");
        self.trans.stop_device();
        self.notif_wait.abort_all();
        self.purge_async_handlers();

        let roc_active = self.status.test_and_clear(
            StatusFlags::ROC_RUNNING | StatusFlags::ROC_AUX_RUNNING,
        ) || !self.time_events.lock().is_idle();
        self.time_events.lock().reset();
        if roc_active {
            self.stack.remain_on_channel_expired();
        }
        match std::mem::replace(&mut st.scan_status, ScanStatus::None) {
            ScanStatus::Os => self.stack.scan_completed(true),
            ScanStatus::Sched => self.stack.sched_scan_stopped(),
            ScanStatus::None => (),
        }

        st.vifs = vif_slots();
        st.phy_ctxts.reset();
        st.bindings.reset();
        st.bf_allowed_vif = None;
        st.p2p_device_vif = None;
        st.csa_vif = None;
        st.vif_count = 0;
        st.rx_ba_sessions = 0;
        st.last_quota_cmd = None;
        st.aux_sta = None;
        st.fw_key_table = 0;
        st.ps_disabled = false;
        self.stations.reset();
        self.queues.lock().reset();

        {
            let mut deferred = self.d0i3_tx.lock();
            deferred.ap_sta_id = None;
            deferred.frames.clear();
        }
        self.status.clear(StatusFlags::IN_D0I3);
        self.status.set(StatusFlags::FIRMWARE_DOWN);
        self.refs.release_all_except(Some(RefType::UcodeDown));
    }

    /// Boots the firmware and loads the device-wide contexts.
    pub(crate) fn fw_start(&self, st: &mut MvmState) -> Result<(), Error> {
        let restarting = self.status.test(StatusFlags::IN_HW_RESTART);
        if restarting {
            self.restart_cleanup(st);
        }
        if let Err(e) = self.load_firmware(st) {
            error!("failed to start firmware: {}", e);
            self.trans.stop_device();
            // The restart is over. Its reference stays as the firmware-down one.
            self.status.clear(StatusFlags::IN_HW_RESTART);
            return Err(e);
        }
        self.status.clear(StatusFlags::FIRMWARE_DOWN);
        if !restarting {
            // Allow low power now. A restart keeps the reference until `restart_complete`.
            self.refs.release(RefType::UcodeDown);
        }
        info!("firmware running");
        Ok(())
    }

    fn load_firmware(&self, st: &mut MvmState) -> Result<(), Error> {
        self.trans.start_firmware()?;
        self.phy_ctxt_add_all(st)?;
        self.add_aux_sta(st)
    }

    pub(crate) fn fw_stop(&self, st: &mut MvmState) {
        // Keeps the transport from entering low power while the firmware is down.
        if !self.status.test(StatusFlags::FIRMWARE_DOWN) {
            self.refs.acquire(RefType::UcodeDown);
        }
        if self.status.test_and_clear(StatusFlags::IN_HW_RESTART) {
            // No restart completion will follow.
            self.refs.release(RefType::UcodeDown);
        }
        self.trans.stop_device();
        self.notif_wait.abort_all();
        self.purge_async_handlers();
        self.del_aux_sta(st);
        self.status.set(StatusFlags::FIRMWARE_DOWN);
        info!("firmware stopped");
    }
}

impl RxHandler for Mvm {
    fn rx_packet(&self, pkt: &Packet) {
        self.notif_wait.notify(pkt);
        match pkt.cmd {
            CommandId::TimeEventNotification => self.rx_time_event_notif(pkt),
            CommandId::ScanCompleteNotification | CommandId::ScanOffloadCompleteNotification => {
                self.queue_async(AsyncWork::Notification(pkt.clone()))
            }
            CommandId::TxResponse => self.rx_tx_response(pkt),
            _ => (),
        }
    }
}
