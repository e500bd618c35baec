// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Firmware time events: session protection and remain-on-channel windows.
//!
//! A time event is known to the firmware by a uid it returns in the add response. The uid is
//! recorded by a notification matcher in the receive path, which also links the event into the
//! device-wide list. Start and end notifications are then resolved by uid under the time-event
//! lock alone.

use {
    crate::{
        error::Error,
        fw_api::{
            CommandId, FwAction, HostCommand, HotSpotCmd, Packet, PacketPayload,
            TimeEventCmd, TimeEventNotifAction, TimeEventType, DEVICE_SYSTEM_TIME_REG,
        },
        mvm::{AsyncWork, Mvm, MvmState},
        refs::RefType,
        status::StatusFlags,
        types::{Channel, RocType, VifId, MAX_MACS},
    },
    log::{debug, error, info, warn},
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
};

/// Longest the firmware may delay an aux remain-on-channel, in milliseconds.
pub const AUX_ROC_MAX_DELAY_MS: u32 = 5000;

pub fn msec_to_tu(ms: u32) -> u32 {
    ((u64::from(ms) * 1000) / 1024) as u32
}

pub fn tu_to_duration(tu: u32) -> Duration {
    Duration::from_micros(u64::from(tu) * 1024)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimeEventKind {
    SessionProtect,
    P2pRoc(RocType),
    /// Remain-on-channel on the aux station.
    HotSpot,
}

impl TimeEventKind {
    fn is_roc(self) -> bool {
        match self {
            TimeEventKind::SessionProtect => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeEventData {
    pub kind: Option<TimeEventKind>,
    /// In TU.
    pub duration: u32,
    pub uid: Option<u32>,
    pub running: bool,
    pub end: Option<Instant>,
}

/// Each interface has one slot for local events and one for aux remain-on-channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TeSlot {
    Session,
    Aux,
}

pub struct TimeEventTable {
    session: Vec<TimeEventData>,
    aux: Vec<TimeEventData>,
    te_list: Vec<VifId>,
    aux_roc_list: Vec<VifId>,
    /// Reference held while a remain-on-channel window is running.
    roc_ref: Option<RefType>,
}

impl TimeEventTable {
    pub fn new() -> Self {
        Self {
            session: vec![TimeEventData::default(); MAX_MACS],
            aux: vec![TimeEventData::default(); MAX_MACS],
            te_list: vec![],
            aux_roc_list: vec![],
            roc_ref: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn slots(&self, slot: TeSlot) -> &Vec<TimeEventData> {
        match slot {
            TeSlot::Session => &self.session,
            TeSlot::Aux => &self.aux,
        }
    }

    pub fn get(&self, vif: VifId, slot: TeSlot) -> TimeEventData {
        self.slots(slot).get(vif.index()).cloned().unwrap_or_default()
    }

    fn get_mut(&mut self, vif: VifId, slot: TeSlot) -> Result<&mut TimeEventData, Error> {
        let slots = match slot {
            TeSlot::Session => &mut self.session,
            TeSlot::Aux => &mut self.aux,
        };
        slots.get_mut(vif.index()).ok_or(Error::InvalidArgument("interface"))
    }

    fn list_mut(&mut self, slot: TeSlot) -> &mut Vec<VifId> {
        match slot {
            TeSlot::Session => &mut self.te_list,
            TeSlot::Aux => &mut self.aux_roc_list,
        }
    }

    /// Records the firmware uid of a pending event and makes it visible to notifications.
    fn link(&mut self, vif: VifId, slot: TeSlot, uid: u32) {
        match self.get_mut(vif, slot) {
            Ok(data) if data.kind.is_some() => data.uid = Some(uid),
            _ => {
                warn!("time event response for idle MAC {}", vif.0);
                return;
            }
        }
        let list = self.list_mut(slot);
        if !list.contains(&vif) {
            list.push(vif);
        }
    }

    /// Empties the slot and returns what it held.
    fn clear(&mut self, vif: VifId, slot: TeSlot) -> TimeEventData {
        self.list_mut(slot).retain(|&v| v != vif);
        match self.get_mut(vif, slot) {
            Ok(data) => std::mem::replace(data, TimeEventData::default()),
            Err(_) => TimeEventData::default(),
        }
    }

    pub fn find_by_uid(&self, uid: u32) -> Option<(VifId, TeSlot)> {
        let session = self
            .te_list
            .iter()
            .find(|v| self.get(**v, TeSlot::Session).uid == Some(uid))
            .map(|&v| (v, TeSlot::Session));
        session.or_else(|| {
            self.aux_roc_list
                .iter()
                .find(|v| self.get(**v, TeSlot::Aux).uid == Some(uid))
                .map(|&v| (v, TeSlot::Aux))
        })
    }

    pub fn is_idle(&self) -> bool {
        self.te_list.is_empty() && self.aux_roc_list.is_empty()
    }

    /// An aux remain-on-channel is pending or running on some interface.
    fn aux_roc_busy(&self) -> bool {
        !self.aux_roc_list.is_empty() || self.aux.iter().any(|data| data.kind.is_some())
    }
}

enum NotifOutcome {
    Started { ref_type: RefType, flag: StatusFlags },
    RocEnded,
}

impl Mvm {
    fn time_event_send_add(
        &self,
        vif_id: VifId,
        slot: TeSlot,
        kind: TimeEventKind,
        duration: u32,
        cmd: HostCommand,
        wait_start: Option<Duration>,
    ) -> Result<(), Error> {
        {
            let mut table = self.time_events.lock();
            let data = table.get_mut(vif_id, slot)?;
            if data.kind.is_some() {
                return Err(Error::violation(format!(
                    "MAC {} already has a pending {:?} time event",
                    vif_id.0, data.kind
                )));
            }
            *data = TimeEventData { kind: Some(kind), duration, ..TimeEventData::default() };
        }

        let table = Arc::clone(&self.time_events);
        let response = self.notif_wait.register(
            &[cmd.id()],
            Some(Box::new(move |pkt: &Packet| {
                if let PacketPayload::TimeEventResponse { status: 0, uid } = pkt.payload {
                    table.lock().link(vif_id, slot, uid);
                }
                true
            })),
        );
        let start = wait_start.map(|_| {
            let table = Arc::clone(&self.time_events);
            self.notif_wait.register(
                &[CommandId::TimeEventNotification],
                Some(Box::new(move |pkt: &Packet| match pkt.payload {
                    PacketPayload::TimeEventNotif {
                        uid, action: TimeEventNotifAction::Start, ..
                    } => table.lock().get(vif_id, slot).uid == Some(uid),
                    _ => false,
                })),
            )
        });

        let sent = match self.send_cmd(cmd) {
            Ok(_) => self.notif_wait.wait(response, self.config.cmd_timeout()),
            Err(e) => {
                self.notif_wait.remove(response);
                Err(e)
            }
        };
        if let Err(e) = sent {
            error!("failed to add {:?} time event for MAC {}: {}", kind, vif_id.0, e);
            if let Some(start) = start {
                self.notif_wait.remove(start);
            }
            self.time_events.lock().clear(vif_id, slot);
            return Err(e);
        }

        if let (Some(start), Some(timeout)) = (start, wait_start) {
            if let Err(e) = self.notif_wait.wait(start, timeout) {
                warn!("time event for MAC {} did not start: {}", vif_id.0, e);
            }
        }
        Ok(())
    }

    /// Keeps the radio on the interface's channel for `duration` TU, e.g. during association.
    /// A running event that still covers `min_duration` is left alone.
    pub(crate) fn protect_session(
        &self,
        vif_id: VifId,
        duration: u32,
        min_duration: u32,
        max_delay: u32,
        wait_for_notif: bool,
    ) -> Result<(), Error> {
        let te = self.time_events.lock().get(vif_id, TeSlot::Session);
        if te.running {
            if let Some(end) = te.end {
                if end > Instant::now() + tu_to_duration(min_duration) {
                    debug!("MAC {} already protected", vif_id.0);
                    return Ok(());
                }
            }
            debug!("replacing session protection of MAC {}", vif_id.0);
            self.remove_time_event(vif_id, TeSlot::Session)?;
        } else if te.kind == Some(TimeEventKind::SessionProtect) {
            debug!("session protection of MAC {} already scheduled", vif_id.0);
            return Ok(());
        }

        let cmd = TimeEventCmd {
            action: FwAction::Add,
            mac_id: vif_id,
            event_type: Some(TimeEventType::SessionProtect),
            uid: None,
            apply_time: self.trans.read_device_register(DEVICE_SYSTEM_TIME_REG),
            max_delay,
            duration,
            notify_start: true,
        };
        let wait_start = if wait_for_notif { Some(tu_to_duration(max_delay)) } else { None };
        self.time_event_send_add(
            vif_id,
            TeSlot::Session,
            TimeEventKind::SessionProtect,
            duration,
            HostCommand::TimeEvent(cmd),
            wait_start,
        )
    }

    pub(crate) fn stop_session_protection(&self, vif_id: VifId) -> Result<(), Error> {
        let kind = self.time_events.lock().get(vif_id, TeSlot::Session).kind;
        if kind == Some(TimeEventKind::SessionProtect) {
            self.remove_time_event(vif_id, TeSlot::Session)?;
        }
        Ok(())
    }

    /// Cancels whatever the slot holds. Removing an empty slot is not an error.
    pub(crate) fn remove_time_event(&self, vif_id: VifId, slot: TeSlot) -> Result<(), Error> {
        let old = self.time_events.lock().clear(vif_id, slot);
        let uid = match (old.kind, old.uid) {
            (Some(_), Some(uid)) => uid,
            (Some(kind), None) => {
                debug!("{:?} time event of MAC {} was never scheduled", kind, vif_id.0);
                return Ok(());
            }
            (None, _) => return Ok(()),
        };
        debug!("removing time event {} of MAC {}", uid, vif_id.0);
        let cmd = if slot == TeSlot::Aux {
            HostCommand::HotSpot(HotSpotCmd {
                action: FwAction::Remove,
                aux_sta: None,
                node_addr: [0; 6],
                band: crate::types::Band::TwoGhz,
                channel: 0,
                apply_time: 0,
                max_delay: 0,
                duration: 0,
                uid: Some(uid),
            })
        } else {
            HostCommand::TimeEvent(TimeEventCmd {
                action: FwAction::Remove,
                mac_id: vif_id,
                event_type: None,
                uid: Some(uid),
                apply_time: 0,
                max_delay: 0,
                duration: 0,
                notify_start: false,
            })
        };
        self.send_cmd(cmd)?;
        Ok(())
    }

    /// Schedules a P2P device remain-on-channel window of `duration_ms`.
    pub(crate) fn start_p2p_roc(
        &self,
        vif_id: VifId,
        duration_ms: u32,
        roc_type: RocType,
    ) -> Result<(), Error> {
        let te = self.time_events.lock().get(vif_id, TeSlot::Session);
        if te.kind.is_some() {
            warn!("MAC {} has a {:?} time event, refusing remain on channel", vif_id.0, te.kind);
            return Err(Error::Busy("remain on channel"));
        }
        let event_type = match roc_type {
            RocType::Normal => TimeEventType::P2pDeviceDiscoverable,
            RocType::MgmtTx => TimeEventType::P2pDeviceActionScan,
        };
        let duration = msec_to_tu(duration_ms);
        let cmd = TimeEventCmd {
            action: FwAction::Add,
            mac_id: vif_id,
            event_type: Some(event_type),
            uid: None,
            apply_time: 0,
            max_delay: msec_to_tu(duration_ms / 2),
            duration,
            notify_start: true,
        };
        self.time_event_send_add(
            vif_id,
            TeSlot::Session,
            TimeEventKind::P2pRoc(roc_type),
            duration,
            HostCommand::TimeEvent(cmd),
            None,
        )
    }

    /// Remain-on-channel for station interfaces, carried by the aux station.
    pub(crate) fn send_aux_roc_cmd(
        &self,
        st: &MvmState,
        vif_id: VifId,
        chan: Channel,
        duration_ms: u32,
    ) -> Result<(), Error> {
        let vif = st.vif(vif_id)?;
        // The aux station carries a single window for the whole device.
        if self.time_events.lock().aux_roc_busy() {
            return Err(Error::violation(format!(
                "aux remain-on-channel already pending, MAC {} refused",
                vif_id.0
            )));
        }
        let duration = msec_to_tu(duration_ms);
        let cmd = HotSpotCmd {
            action: FwAction::Add,
            aux_sta: st.aux_sta,
            node_addr: vif.addr,
            band: chan.band,
            channel: chan.number,
            apply_time: self.trans.read_device_register(DEVICE_SYSTEM_TIME_REG),
            max_delay: msec_to_tu(AUX_ROC_MAX_DELAY_MS),
            duration,
            uid: None,
        };
        self.time_event_send_add(
            vif_id,
            TeSlot::Aux,
            TimeEventKind::HotSpot,
            duration,
            HostCommand::HotSpot(cmd),
            None,
        )
    }

    /// Cancels the running P2P remain-on-channel, or else the aux one.
    pub(crate) fn stop_roc(&self) {
        let target = {
            let table = self.time_events.lock();
            table
                .te_list
                .iter()
                .find(|v| match table.get(**v, TeSlot::Session).kind {
                    Some(TimeEventKind::P2pRoc(_)) => true,
                    _ => false,
                })
                .map(|&v| (v, TeSlot::Session))
                .or_else(|| table.aux_roc_list.first().map(|&v| (v, TeSlot::Aux)))
        };
        let (vif_id, slot) = match target {
            Some(target) => target,
            None => {
                error!("no remain on channel event to stop");
                return;
            }
        };
        if let Err(e) = self.remove_time_event(vif_id, slot) {
            error!("failed to remove remain on channel of MAC {}: {}", vif_id.0, e);
        }
        self.roc_finished();
    }

    /// Ends the remain-on-channel period. Flushing the off-channel queue and dropping the
    /// reference are deferred to the async worker.
    pub(crate) fn roc_finished(&self) {
        self.status.clear(StatusFlags::ROC_RUNNING | StatusFlags::ROC_AUX_RUNNING);
        let roc_ref = self.time_events.lock().roc_ref.take();
        self.queue_async(AsyncWork::RocDone(roc_ref));
    }

    /// Start and end notifications, from the receive path.
    pub(crate) fn rx_time_event_notif(&self, pkt: &Packet) {
        let (uid, action, success) = match pkt.payload {
            PacketPayload::TimeEventNotif { uid, action, success } => (uid, action, success),
            _ => return,
        };
        let outcome = {
            let mut table = self.time_events.lock();
            let (vif_id, slot) = match table.find_by_uid(uid) {
                Some(found) => found,
                None => {
                    debug!("notification for unknown time event {}", uid);
                    return;
                }
            };
            let kind = match table.get(vif_id, slot).kind {
                Some(kind) => kind,
                None => return,
            };
            match action {
                TimeEventNotifAction::Start if success => {
                    if let Ok(data) = table.get_mut(vif_id, slot) {
                        data.running = true;
                        data.end = Some(Instant::now() + tu_to_duration(data.duration));
                    }
                    debug!("time event {} of MAC {} started", uid, vif_id.0);
                    match kind {
                        TimeEventKind::SessionProtect => None,
                        TimeEventKind::P2pRoc(_) => {
                            table.roc_ref = Some(RefType::Roc);
                            Some(NotifOutcome::Started {
                                ref_type: RefType::Roc,
                                flag: StatusFlags::ROC_RUNNING,
                            })
                        }
                        TimeEventKind::HotSpot => {
                            table.roc_ref = Some(RefType::RocAux);
                            Some(NotifOutcome::Started {
                                ref_type: RefType::RocAux,
                                flag: StatusFlags::ROC_AUX_RUNNING,
                            })
                        }
                    }
                }
                _ => {
                    if !success {
                        warn!("time event {} of MAC {} failed to start", uid, vif_id.0);
                    } else {
                        info!("time event {} of MAC {} ended", uid, vif_id.0);
                    }
                    table.clear(vif_id, slot);
                    if kind.is_roc() {
                        Some(NotifOutcome::RocEnded)
                    } else {
                        None
                    }
                }
            }
        };
        match outcome {
            Some(NotifOutcome::Started { ref_type, flag }) => {
                self.status.set(flag);
                self.refs.acquire(ref_type);
                self.stack.ready_on_channel();
            }
            Some(NotifOutcome::RocEnded) => {
                self.roc_finished();
                self.stack.remain_on_channel_expired();
            }
            None => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            device::{RxHandler, StackEvent},
            types::{VifType, OFFCHANNEL_QUEUE},
            testutil::TestHelper,
        },
        assert_matches::assert_matches,
        std::thread,
    };

    fn vif(h: &TestHelper, vif_type: VifType) -> VifId {
        let mut st = h.mvm.state.lock();
        let vif = h.mvm.mac_ctxt_init(&mut st, &h.vif_params(vif_type)).expect("init");
        h.trans.clear();
        vif
    }

    #[test]
    fn tu_conversion() {
        assert_eq!(msec_to_tu(1024), 1000);
        assert_eq!(tu_to_duration(1000), Duration::from_millis(1024));
    }

    #[test]
    fn add_records_uid_from_response() {
        let h = TestHelper::started();
        let vif = vif(&h, VifType::Station);
        h.mvm.protect_session(vif, 500, 400, 500, false).expect("protect");
        let uid = h.trans.last_uid();
        let table = h.mvm.time_events.lock();
        assert_eq!(table.find_by_uid(uid), Some((vif, TeSlot::Session)));
        assert_eq!(table.get(vif, TeSlot::Session).kind, Some(TimeEventKind::SessionProtect));
    }

    #[test]
    fn apply_time_read_from_device() {
        let h = TestHelper::started();
        let vif = vif(&h, VifType::Station);
        h.trans.state.lock().registers.insert(DEVICE_SYSTEM_TIME_REG, 1234);
        h.mvm.protect_session(vif, 300, 200, 500, false).expect("protect");
        assert_matches!(
            &h.trans.drain_commands()[..],
            [HostCommand::TimeEvent(TimeEventCmd { apply_time: 1234, duration: 300, .. })]
        );
    }

    #[test]
    fn rejected_add_clears_record() {
        let h = TestHelper::started();
        let vif = vif(&h, VifType::Station);
        h.trans.reject(CommandId::TimeEvent, 1);
        assert_matches!(
            h.mvm.protect_session(vif, 500, 400, 500, false),
            Err(Error::FirmwareRejected { .. })
        );
        assert_eq!(h.mvm.time_events.lock().get(vif, TeSlot::Session), TimeEventData::default());
        assert!(h.mvm.time_events.lock().is_idle());
    }

    #[test]
    fn running_protection_covering_min_duration_is_kept() {
        let h = TestHelper::started();
        let vif = vif(&h, VifType::Station);
        h.mvm.protect_session(vif, 500, 400, 500, false).expect("protect");
        h.mvm.rx_packet(&Packet::time_event_notif(h.trans.last_uid(), TimeEventNotifAction::Start));
        h.trans.clear();

        h.mvm.protect_session(vif, 500, 100, 500, false).expect("still protected");
        assert!(h.trans.sent_ids().is_empty());

        // Nothing covers a minimum longer than the whole event: replace it.
        h.mvm.protect_session(vif, 500, 10_000, 500, false).expect("replace");
        assert_eq!(h.trans.sent_ids(), vec![CommandId::TimeEvent, CommandId::TimeEvent]);
    }

    #[test]
    fn wait_for_start_notification() {
        let h = TestHelper::started();
        let vif = vif(&h, VifType::Station);
        let uid = h.trans.state.lock().next_uid;
        let notifier = {
            let trans = h.trans.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                trans.deliver(&Packet::time_event_notif(uid, TimeEventNotifAction::Start));
            })
        };
        h.mvm.protect_session(vif, 500, 400, 5000, true).expect("protect");
        notifier.join().expect("notifier thread panicked");
        assert!(h.mvm.time_events.lock().get(vif, TeSlot::Session).running);
    }

    #[test]
    fn removal_is_idempotent() {
        let h = TestHelper::started();
        let vif = vif(&h, VifType::Station);
        h.mvm.protect_session(vif, 500, 400, 500, false).expect("protect");
        h.trans.clear();
        h.mvm.remove_time_event(vif, TeSlot::Session).expect("remove");
        h.mvm.remove_time_event(vif, TeSlot::Session).expect("remove again");
        h.mvm.stop_session_protection(vif).expect("stop");
        assert_eq!(h.trans.sent_ids(), vec![CommandId::TimeEvent]);
    }

    #[test]
    fn p2p_roc_start_and_expiry() {
        let h = TestHelper::started();
        let vif = vif(&h, VifType::P2pDevice);
        h.mvm.start_p2p_roc(vif, 300, RocType::Normal).expect("roc");
        assert_matches!(h.mvm.start_p2p_roc(vif, 300, RocType::Normal), Err(Error::Busy(_)));
        let uid = h.trans.last_uid();

        h.mvm.rx_packet(&Packet::time_event_notif(uid, TimeEventNotifAction::Start));
        assert!(h.mvm.status.test(StatusFlags::ROC_RUNNING));
        assert_eq!(h.mvm.refs.count(RefType::Roc), 1);
        assert_eq!(h.stack.drain_events(), vec![StackEvent::ReadyOnChannel]);

        h.mvm.rx_packet(&Packet::time_event_notif(uid, TimeEventNotifAction::End));
        assert!(!h.mvm.status.test(StatusFlags::ROC_RUNNING));
        assert_eq!(h.stack.drain_events(), vec![StackEvent::RocExpired]);
        assert!(h.mvm.time_events.lock().is_idle());

        // Flush and reference drop happen on the async worker.
        assert_eq!(h.mvm.refs.count(RefType::Roc), 1);
        h.mvm.process_async_handlers();
        assert_eq!(h.mvm.refs.count(RefType::Roc), 0);
        assert_eq!(h.trans.state.lock().flushed, vec![1 << OFFCHANNEL_QUEUE]);
    }

    #[test]
    fn unknown_uid_ignored() {
        let h = TestHelper::started();
        h.mvm.rx_packet(&Packet::time_event_notif(9999, TimeEventNotifAction::Start));
        assert!(h.stack.drain_events().is_empty());
        assert!(!h.mvm.status.test(StatusFlags::ROC_RUNNING));
    }

    #[test]
    fn aux_roc_lifecycle() {
        let h = TestHelper::started();
        let vif = vif(&h, VifType::Station);
        {
            let st = h.mvm.state.lock();
            h.mvm.send_aux_roc_cmd(&st, vif, Channel::new_5ghz(36), 100).expect("aux roc");
            assert_matches!(
                h.mvm.send_aux_roc_cmd(&st, vif, Channel::new_5ghz(36), 100),
                Err(Error::ProtocolViolation(_))
            );
        }
        let uid = h.trans.last_uid();
        assert_eq!(h.mvm.time_events.lock().find_by_uid(uid), Some((vif, TeSlot::Aux)));

        h.mvm.rx_packet(&Packet::time_event_notif(uid, TimeEventNotifAction::Start));
        assert!(h.mvm.status.test(StatusFlags::ROC_AUX_RUNNING));
        assert_eq!(h.mvm.refs.count(RefType::RocAux), 1);

        h.trans.clear();
        h.mvm.stop_roc();
        assert_matches!(
            &h.trans.drain_commands()[..],
            [HostCommand::HotSpot(HotSpotCmd { action: FwAction::Remove, .. })]
        );
        assert!(!h.mvm.status.test(StatusFlags::ROC_AUX_RUNNING));
        h.mvm.process_async_handlers();
        assert_eq!(h.mvm.refs.count(RefType::RocAux), 0);
    }

    #[test]
    fn aux_roc_is_one_per_device() {
        let h = TestHelper::started();
        let first = vif(&h, VifType::Station);
        let second = vif(&h, VifType::Station);
        let st = h.mvm.state.lock();
        h.mvm.send_aux_roc_cmd(&st, first, Channel::new_5ghz(36), 100).expect("aux roc");
        h.trans.clear();
        assert_matches!(
            h.mvm.send_aux_roc_cmd(&st, second, Channel::new_2ghz(6), 100),
            Err(Error::ProtocolViolation(_))
        );
        assert!(h.trans.sent_ids().is_empty());
        assert_eq!(h.mvm.time_events.lock().get(second, TeSlot::Aux).kind, None);
    }

    #[test]
    fn stop_without_roc_does_nothing() {
        let h = TestHelper::started();
        h.trans.clear();
        h.mvm.stop_roc();
        assert!(h.trans.sent_ids().is_empty());
    }
}
