// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Firmware station table and per-station aggregation state.
//!
//! The table is read from the receive path (transmit responses) under its read lock; entries are
//! only added or removed with the device mutex held. Per-TID counters live behind each
//! station's own lock. No command is sent while a station lock is held, since the receive path
//! may need the same lock to deliver the response.

use {
    crate::{
        error::Error,
        fw_api::{AddStaCmd, HostCommand, Packet, PacketPayload, ScdQueueCfgCmd},
        mvm::{Mvm, MvmState},
        types::{
            MacAddr, PeerSta, StaState, StaId, VifId, BROADCAST_ADDR, MAX_MACS, OFFCHANNEL_QUEUE,
            STATION_COUNT, TID_COUNT, ZERO_ADDR,
        },
    },
    log::{debug, error, info, warn},
    parking_lot::{Mutex, RwLock},
    std::sync::Arc,
};

/// MAC id the firmware reserves for the aux station.
pub const AUX_MAC_ID: VifId = VifId(MAX_MACS as u8);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TidAggState {
    Off,
    Starting,
    /// Waiting for frames queued before the session to drain before reporting ready.
    EmptyingQueueForAddba,
    On,
    /// Waiting for the aggregation queue to drain before tearing the session down.
    EmptyingQueueForDelba,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TidData {
    pub state: TidAggState,
    /// Frames handed to the hardware and not reclaimed yet.
    pub queued: u16,
    pub seq_number: u16,
    pub txq: Option<u8>,
    pub ssn: u16,
}

impl Default for TidData {
    fn default() -> Self {
        Self { state: TidAggState::Off, queued: 0, seq_number: 0, txq: None, ssn: 0 }
    }
}

#[derive(Debug)]
pub struct StaInner {
    pub state: StaState,
    pub tid: [TidData; TID_COUNT],
    pub asleep: bool,
    pub tfd_queue_msk: u32,
    /// Bitmask of TIDs with an operational aggregation session.
    pub agg_tids: u8,
    pub max_agg_bufsize: u8,
}

impl StaInner {
    fn new(tfd_queue_msk: u32) -> Self {
        Self {
            state: StaState::NotExist,
            tid: [TidData::default(); TID_COUNT],
            asleep: false,
            tfd_queue_msk,
            agg_tids: 0,
            max_agg_bufsize: u8::max_value(),
        }
    }

    pub fn queued_total(&self) -> u32 {
        self.tid.iter().map(|t| u32::from(t.queued)).sum()
    }
}

#[derive(Debug)]
pub struct Station {
    pub sta_id: StaId,
    pub vif: VifId,
    pub addr: MacAddr,
    pub tdls: bool,
    pub inner: Mutex<StaInner>,
}

#[derive(Debug, Clone)]
enum StaSlot {
    Free,
    /// Broadcast and aux stations; never visible to the receive path.
    Internal,
    Peer { sta: Arc<Station>, visible: bool },
}

pub struct StationTable {
    slots: RwLock<Vec<StaSlot>>,
}

impl StationTable {
    pub fn new() -> Self {
        Self { slots: RwLock::new(vec![StaSlot::Free; STATION_COUNT]) }
    }

    pub fn reset(&self) {
        *self.slots.write() = vec![StaSlot::Free; STATION_COUNT];
    }

    /// Lookup for the receive path. Stations being removed are not returned.
    pub fn get(&self, sta_id: StaId) -> Option<Arc<Station>> {
        match self.slots.read().get(sta_id.index()) {
            Some(StaSlot::Peer { sta, visible: true }) => Some(Arc::clone(sta)),
            _ => None,
        }
    }

    pub fn find(&self, vif: VifId, addr: &MacAddr) -> Option<Arc<Station>> {
        self.slots.read().iter().find_map(|slot| match slot {
            StaSlot::Peer { sta, .. } if sta.vif == vif && &sta.addr == addr => {
                Some(Arc::clone(sta))
            }
            _ => None,
        })
    }

    pub fn peers(&self) -> Vec<Arc<Station>> {
        self.slots
            .read()
            .iter()
            .filter_map(|slot| match slot {
                StaSlot::Peer { sta, .. } => Some(Arc::clone(sta)),
                _ => None,
            })
            .collect()
    }

    pub fn tdls_count(&self, vif: Option<VifId>) -> usize {
        self.peers().iter().filter(|sta| sta.tdls && vif.map_or(true, |v| sta.vif == v)).count()
    }

    fn insert(&self, vif: VifId, peer: &PeerSta, tfd_queue_msk: u32) -> Result<Arc<Station>, Error> {
        let mut slots = self.slots.write();
        let index = slots
            .iter()
            .position(|slot| match slot {
                StaSlot::Free => true,
                _ => false,
            })
            .ok_or(Error::ResourceExhausted("station"))?;
        let sta = Arc::new(Station {
            sta_id: StaId(index as u8),
            vif,
            addr: peer.addr,
            tdls: peer.tdls,
            inner: Mutex::new(StaInner::new(tfd_queue_msk)),
        });
        slots[index] = StaSlot::Peer { sta: Arc::clone(&sta), visible: true };
        Ok(sta)
    }

    pub fn reserve_internal(&self) -> Result<StaId, Error> {
        let mut slots = self.slots.write();
        let index = slots
            .iter()
            .position(|slot| match slot {
                StaSlot::Free => true,
                _ => false,
            })
            .ok_or(Error::ResourceExhausted("station"))?;
        slots[index] = StaSlot::Internal;
        Ok(StaId(index as u8))
    }

    pub fn release(&self, sta_id: StaId) {
        if let Some(slot) = self.slots.write().get_mut(sta_id.index()) {
            *slot = StaSlot::Free;
        }
    }

    pub fn hide(&self, sta_id: StaId) {
        if let Some(StaSlot::Peer { visible, .. }) = self.slots.write().get_mut(sta_id.index()) {
            *visible = false;
        }
    }

    pub fn used(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|slot| match slot {
                StaSlot::Free => false,
                _ => true,
            })
            .count()
    }
}

/// Work produced under a station lock and carried out after releasing it.
enum TidEvent {
    StartReady(u8),
    StopReady { tid: u8, queue: u8, disable: bool },
    Unbuffered(u8),
}

impl Mvm {
    fn sta_modify_cmd(&self, sta: &Station) -> AddStaCmd {
        let inner = sta.inner.lock();
        let mut cmd = AddStaCmd::modify(sta.sta_id, sta.vif, sta.addr, inner.tfd_queue_msk);
        cmd.awake = !inner.asleep;
        cmd
    }

    pub(crate) fn add_sta(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        peer: &PeerSta,
    ) -> Result<Arc<Station>, Error> {
        let vif = st.vif(vif_id)?;
        let tfd_queue_msk = vif.queues_mask();
        let managed = vif.vif_type.is_managed();
        let sta = self.stations.insert(vif_id, peer, tfd_queue_msk)?;
        if let Err(e) = self.send_cmd(HostCommand::AddSta(AddStaCmd::new(
            sta.sta_id,
            vif_id,
            peer.addr,
            tfd_queue_msk,
        ))) {
            self.stations.release(sta.sta_id);
            return Err(e);
        }
        sta.inner.lock().state = StaState::None;
        if managed && !peer.tdls {
            st.vif_mut(vif_id)?.ap_sta_id = Some(sta.sta_id);
        }
        info!("station {} added on MAC {}", sta.sta_id.0, vif_id.0);
        Ok(sta)
    }

    pub(crate) fn update_sta(&self, sta: &Station) -> Result<(), Error> {
        let cmd = self.sta_modify_cmd(sta);
        self.send_cmd(HostCommand::AddSta(cmd))?;
        Ok(())
    }

    /// Drains everything the station still has queued, then forgets its aggregation state.
    fn drain_sta(&self, sta: &Station) -> Result<(), Error> {
        let mask = sta.inner.lock().tfd_queue_msk;
        self.trans.flush_tx_path(mask)?;
        self.trans.wait_tx_queue_empty(mask, self.config.cmd_timeout())?;
        let agg_queues: Vec<u8> = {
            let mut inner = sta.inner.lock();
            let queues = inner.tid.iter_mut().filter_map(|t| t.txq.take()).collect();
            for tid in inner.tid.iter_mut() {
                *tid = TidData { seq_number: tid.seq_number, ..TidData::default() };
            }
            inner.agg_tids = 0;
            queues
        };
        let mut pool = self.queues.lock();
        agg_queues.into_iter().for_each(|q| pool.free(q));
        Ok(())
    }

    pub(crate) fn rm_sta(&self, st: &mut MvmState, sta: &Arc<Station>) -> Result<(), Error> {
        if let Err(e) = self.drain_sta(sta) {
            error!("failed to drain station {}: {}", sta.sta_id.0, e);
        }
        let result = self.send_cmd(HostCommand::RemoveSta { sta_id: sta.sta_id }).map(|_| ());
        if let Ok(vif) = st.vif_mut(sta.vif) {
            if vif.ap_sta_id == Some(sta.sta_id) {
                vif.ap_sta_id = None;
            }
        }
        sta.inner.lock().state = StaState::NotExist;
        self.stations.release(sta.sta_id);
        info!("station {} removed", sta.sta_id.0);
        result
    }

    /// Removes a firmware station by id, used for the AP station left over at disassociation.
    pub(crate) fn rm_sta_id(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        sta_id: StaId,
    ) -> Result<(), Error> {
        let result = self.send_cmd(HostCommand::RemoveSta { sta_id }).map(|_| ());
        self.stations.release(sta_id);
        if let Ok(vif) = st.vif_mut(vif_id) {
            if vif.ap_sta_id == Some(sta_id) {
                vif.ap_sta_id = None;
            }
        }
        result
    }

    pub(crate) fn sta_rx_agg(
        &self,
        st: &mut MvmState,
        sta: &Station,
        tid: u8,
        ssn: u16,
        start: bool,
    ) -> Result<(), Error> {
        if start && st.rx_ba_sessions >= self.config.max_rx_ba_sessions {
            warn!("not enough rx BA sessions");
            return Err(Error::ResourceExhausted("rx BA session"));
        }
        let mut cmd = self.sta_modify_cmd(sta);
        if start {
            cmd.add_immediate_ba_tid = Some((tid, ssn));
        } else {
            cmd.remove_immediate_ba_tid = Some(tid);
        }
        self.send_cmd(HostCommand::AddSta(cmd))?;
        if start {
            st.rx_ba_sessions += 1;
        } else if st.rx_ba_sessions > 0 {
            st.rx_ba_sessions -= 1;
        } else {
            warn!("rx BA session count underflow");
        }
        debug!("rx BA tid {} {} for station {}", tid, if start { "on" } else { "off" }, sta.sta_id.0);
        Ok(())
    }

    /// Starts a transmit aggregation session and returns the starting sequence number.
    pub(crate) fn sta_tx_agg_start(&self, sta: &Station, tid: u8) -> Result<u16, Error> {
        let tid_index = tid_index(tid)?;
        {
            let inner = sta.inner.lock();
            let state = inner.tid[tid_index].state;
            if state != TidAggState::Off {
                return Err(Error::InvalidTransition(format!(
                    "tx agg start on tid {} in state {:?}",
                    tid, state
                )));
            }
        }
        let queue = self.queues.lock().alloc()?;
        let (ssn, ready) = {
            let mut inner = sta.inner.lock();
            let data = &mut inner.tid[tid_index];
            data.txq = Some(queue);
            data.ssn = data.seq_number;
            data.state = if data.queued == 0 {
                TidAggState::Starting
            } else {
                TidAggState::EmptyingQueueForAddba
            };
            (data.ssn, data.state == TidAggState::Starting)
        };
        debug!("tx agg start station {} tid {} queue {} ssn {}", sta.sta_id.0, tid, queue, ssn);
        if ready {
            self.stack.start_tx_ba_ready(sta.addr, tid);
        }
        Ok(ssn)
    }

    pub(crate) fn sta_tx_agg_oper(&self, sta: &Station, tid: u8, buf_size: u8) -> Result<(), Error> {
        let tid_index = tid_index(tid)?;
        let (queue, ssn) = {
            let inner = sta.inner.lock();
            let data = &inner.tid[tid_index];
            match (data.state, data.txq) {
                (TidAggState::Starting, Some(queue)) => (queue, data.ssn),
                (state, _) => {
                    return Err(Error::InvalidTransition(format!(
                        "tx agg operational on tid {} in state {:?}",
                        tid, state
                    )))
                }
            }
        };
        self.send_cmd(HostCommand::ScdQueueConfig(ScdQueueCfgCmd {
            queue,
            sta_id: sta.sta_id,
            tid,
            enable: true,
            frame_limit: buf_size,
            ssn,
        }))?;
        {
            let mut inner = sta.inner.lock();
            inner.tid[tid_index].state = TidAggState::On;
            inner.tfd_queue_msk |= 1 << queue;
            inner.agg_tids |= 1 << tid;
            inner.max_agg_bufsize = inner.max_agg_bufsize.min(buf_size);
        }
        self.update_sta(sta)
    }

    pub(crate) fn sta_tx_agg_stop(&self, sta: &Station, tid: u8) -> Result<(), Error> {
        let tid_index = tid_index(tid)?;
        let (queue, was_on) = {
            let mut inner = sta.inner.lock();
            let data = inner.tid[tid_index];
            match data.state {
                TidAggState::On if data.queued > 0 => {
                    debug!("tx agg stop tid {} waits for {} frames", tid, data.queued);
                    inner.tid[tid_index].state = TidAggState::EmptyingQueueForDelba;
                    return Ok(());
                }
                TidAggState::On | TidAggState::Starting | TidAggState::EmptyingQueueForAddba => {
                    let was_on = data.state == TidAggState::On;
                    let queue = inner.tid[tid_index].txq.take();
                    inner.tid[tid_index].state = TidAggState::Off;
                    if let (true, Some(q)) = (was_on, queue) {
                        inner.tfd_queue_msk &= !(1 << q);
                        inner.agg_tids &= !(1 << tid);
                    }
                    (queue, was_on)
                }
                state => {
                    return Err(Error::InvalidTransition(format!(
                        "tx agg stop on tid {} in state {:?}",
                        tid, state
                    )))
                }
            }
        };
        if let Some(queue) = queue {
            if was_on {
                self.send_cmd(HostCommand::ScdQueueConfig(disable_queue(queue, sta.sta_id, tid)))?;
            }
            self.queues.lock().free(queue);
        }
        self.stack.stop_tx_ba_ready(sta.addr, tid);
        Ok(())
    }

    /// Tears the session down without waiting for the peer: flush, wait for empty, release.
    pub(crate) fn sta_tx_agg_flush(&self, sta: &Station, tid: u8) -> Result<(), Error> {
        let tid_index = tid_index(tid)?;
        let (queue, was_on) = {
            let mut inner = sta.inner.lock();
            let data = inner.tid[tid_index];
            if data.state == TidAggState::Off {
                return Err(Error::InvalidTransition(format!("tx agg flush on idle tid {}", tid)));
            }
            let was_on =
                data.state == TidAggState::On || data.state == TidAggState::EmptyingQueueForDelba;
            let queue = inner.tid[tid_index].txq.take();
            inner.tid[tid_index].state = TidAggState::Off;
            if let (true, Some(q)) = (was_on, queue) {
                inner.tfd_queue_msk &= !(1 << q);
                inner.agg_tids &= !(1 << tid);
            }
            (queue, was_on)
        };
        if let Some(queue) = queue {
            if was_on {
                self.trans.flush_tx_path(1 << queue)?;
                self.trans.wait_tx_queue_empty(1 << queue, self.config.cmd_timeout())?;
                self.send_cmd(HostCommand::ScdQueueConfig(disable_queue(queue, sta.sta_id, tid)))?;
            }
            self.queues.lock().free(queue);
        }
        Ok(())
    }

    /// Aggregation queue frames of `tid` go to, if a session is operational.
    pub(crate) fn sta_tx_agg_queue(&self, sta: &Station, tid: u8) -> Option<u8> {
        let inner = sta.inner.lock();
        let data = inner.tid.get(tid as usize)?;
        match data.state {
            TidAggState::On => data.txq,
            _ => None,
        }
    }

    /// Accounts a frame the hardware accepted.
    pub(crate) fn sta_tx_queued(&self, sta: &Station, tid: u8) {
        let mut inner = sta.inner.lock();
        if let Some(data) = inner.tid.get_mut(tid as usize) {
            data.queued = data.queued.saturating_add(1);
            data.seq_number = data.seq_number.wrapping_add(1);
        }
    }

    /// Transmit response from the receive path: reclaims frames and completes pending drains.
    pub(crate) fn rx_tx_response(&self, pkt: &Packet) {
        let (sta_id, tid, frames) = match pkt.payload {
            PacketPayload::TxResponse { sta_id, tid, frames } => (sta_id, tid, frames),
            _ => return,
        };
        let sta = match self.stations.get(sta_id) {
            Some(sta) => sta,
            None => {
                debug!("tx response for unknown station {}", sta_id.0);
                return;
            }
        };
        let tid_index = tid as usize;
        if tid_index >= TID_COUNT {
            warn!("tx response for invalid tid {}", tid);
            return;
        }
        let mut events = vec![];
        {
            let mut inner = sta.inner.lock();
            let asleep = inner.asleep;
            let data = &mut inner.tid[tid_index];
            data.queued = data.queued.saturating_sub(frames);
            if data.queued == 0 {
                match data.state {
                    TidAggState::EmptyingQueueForAddba => {
                        data.state = TidAggState::Starting;
                        events.push(TidEvent::StartReady(tid));
                    }
                    TidAggState::EmptyingQueueForDelba => {
                        data.state = TidAggState::Off;
                        if let Some(queue) = data.txq.take() {
                            inner.tfd_queue_msk &= !(1 << queue);
                            inner.agg_tids &= !(1 << tid);
                            events.push(TidEvent::StopReady { tid, queue, disable: true });
                        }
                    }
                    _ => (),
                }
                if asleep {
                    events.push(TidEvent::Unbuffered(tid));
                }
            }
        }
        for event in events {
            match event {
                TidEvent::StartReady(tid) => self.stack.start_tx_ba_ready(sta.addr, tid),
                TidEvent::StopReady { tid, queue, disable } => {
                    if disable {
                        let cmd = HostCommand::ScdQueueConfig(disable_queue(queue, sta_id, tid));
                        if let Err(e) = self.trans.send_command_async(&cmd) {
                            error!("failed to disable queue {}: {}", queue, e);
                        }
                    }
                    self.queues.lock().free(queue);
                    self.stack.stop_tx_ba_ready(sta.addr, tid);
                }
                TidEvent::Unbuffered(tid) => self.stack.sta_set_buffered(sta.addr, tid, false),
            }
        }
    }

    pub(crate) fn sta_notify_sleep(&self, sta: &Station) {
        let (pending, buffered) = {
            let mut inner = sta.inner.lock();
            inner.asleep = true;
            let buffered: Vec<u8> = inner
                .tid
                .iter()
                .enumerate()
                .filter(|(_, t)| {
                    (t.state == TidAggState::On || t.state == TidAggState::EmptyingQueueForDelba)
                        && t.queued > 0
                })
                .map(|(i, _)| i as u8)
                .collect();
            (inner.queued_total() > 0, buffered)
        };
        if pending {
            self.stack.sta_block_awake(sta.addr, true);
        }
        for tid in buffered {
            self.stack.sta_set_buffered(sta.addr, tid, true);
        }
    }

    pub(crate) fn sta_notify_awake(&self, sta: &Station) -> Result<(), Error> {
        sta.inner.lock().asleep = false;
        let cmd = self.sta_modify_cmd(sta);
        self.send_cmd_async(HostCommand::AddSta(cmd))
    }

    /// Blocks or unblocks transmission to a station, used around channel switches.
    pub(crate) fn sta_modify_disable_tx(&self, sta: &Station, disable: bool) -> Result<(), Error> {
        let mut cmd = self.sta_modify_cmd(sta);
        cmd.disable_tx = disable;
        self.send_cmd(HostCommand::AddSta(cmd))?;
        Ok(())
    }

    /// Lets a sleeping station receive `num_frames` frames from the TIDs in `tids`.
    pub(crate) fn sta_modify_sleep_tx_count(
        &self,
        sta: &Station,
        num_frames: u16,
        tids: u8,
    ) -> Result<(), Error> {
        let mut cmd = self.sta_modify_cmd(sta);
        cmd.awake = false;
        cmd.sleep_tx_count = Some((num_frames, u16::from(tids)));
        self.send_cmd_async(HostCommand::AddSta(cmd))
    }

    /// Power save is only allowed without TDLS peers; recompute when that changes.
    pub(crate) fn recalc_tdls_state(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        sta_added: bool,
    ) -> Result<(), Error> {
        let count = self.stations.tdls_count(Some(vif_id));
        if (sta_added && count == 1) || (!sta_added && count == 0) {
            debug!("TDLS peers on MAC {}: {}", vif_id.0, count);
            self.power_update_mac(st)?;
        }
        Ok(())
    }

    pub(crate) fn teardown_tdls_peers(&self) {
        for sta in self.stations.peers().into_iter().filter(|sta| sta.tdls) {
            self.stack.tdls_teardown(sta.vif, sta.addr);
        }
    }

    /// Reserves the broadcast station of an AP, IBSS or P2P device interface.
    pub(crate) fn alloc_bcast_sta(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let id = self.stations.reserve_internal()?;
        st.vif_mut(vif_id)?.bcast_sta = Some(id);
        Ok(())
    }

    pub(crate) fn dealloc_bcast_sta(&self, st: &mut MvmState, vif_id: VifId) {
        if let Ok(vif) = st.vif_mut(vif_id) {
            if let Some(id) = vif.bcast_sta.take() {
                self.stations.release(id);
            }
        }
    }

    pub(crate) fn send_add_bcast_sta(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let vif = st.vif(vif_id)?;
        let sta_id = vif
            .bcast_sta
            .ok_or_else(|| Error::violation(format!("MAC {} has no broadcast station", vif_id.0)))?;
        let cmd = AddStaCmd::new(sta_id, vif_id, BROADCAST_ADDR, vif.queues_mask());
        self.send_cmd(HostCommand::AddSta(cmd))?;
        Ok(())
    }

    pub(crate) fn send_rm_bcast_sta(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let sta_id = st
            .vif(vif_id)?
            .bcast_sta
            .ok_or_else(|| Error::violation(format!("MAC {} has no broadcast station", vif_id.0)))?;
        self.send_cmd(HostCommand::RemoveSta { sta_id })?;
        Ok(())
    }

    pub(crate) fn add_bcast_sta(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        self.alloc_bcast_sta(st, vif_id)?;
        if let Err(e) = self.send_add_bcast_sta(st, vif_id) {
            self.dealloc_bcast_sta(st, vif_id);
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn rm_bcast_sta(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let result = self.send_rm_bcast_sta(st, vif_id);
        self.dealloc_bcast_sta(st, vif_id);
        result
    }

    /// The aux station carries off-channel frames of the hotspot remain-on-channel.
    pub(crate) fn add_aux_sta(&self, st: &mut MvmState) -> Result<(), Error> {
        let sta_id = self.stations.reserve_internal()?;
        let cmd = AddStaCmd::new(sta_id, AUX_MAC_ID, ZERO_ADDR, 1 << OFFCHANNEL_QUEUE);
        if let Err(e) = self.send_cmd(HostCommand::AddSta(cmd)) {
            self.stations.release(sta_id);
            return Err(e);
        }
        st.aux_sta = Some(sta_id);
        Ok(())
    }

    pub(crate) fn del_aux_sta(&self, st: &mut MvmState) {
        if let Some(sta_id) = st.aux_sta.take() {
            self.stations.release(sta_id);
        }
    }
}

fn tid_index(tid: u8) -> Result<usize, Error> {
    if (tid as usize) < TID_COUNT {
        Ok(tid as usize)
    } else {
        Err(Error::InvalidArgument("tid"))
    }
}

fn disable_queue(queue: u8, sta_id: StaId, tid: u8) -> ScdQueueCfgCmd {
    ScdQueueCfgCmd { queue, sta_id, tid, enable: false, frame_limit: 0, ssn: 0 }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            device::StackEvent,
            fw_api::CommandId,
            testutil::TestHelper,
            types::VifType,
        },
        assert_matches::assert_matches,
    };

    const PEER: MacAddr = [2, 0, 0, 0, 0, 1];

    fn station(h: &TestHelper) -> (VifId, Arc<Station>) {
        let mut st = h.mvm.state.lock();
        let vif = h.mvm.mac_ctxt_init(&mut st, &h.vif_params(VifType::Station)).expect("init");
        let sta = h.mvm.add_sta(&mut st, vif, &PeerSta::new(PEER)).expect("add sta");
        h.trans.clear();
        h.stack.drain_events();
        (vif, sta)
    }

    #[test]
    fn add_sta_becomes_ap_sta() {
        let h = TestHelper::started();
        let (vif, sta) = station(&h);
        let st = h.mvm.state.lock();
        assert_eq!(st.vif(vif).expect("vif").ap_sta_id, Some(sta.sta_id));
        assert_eq!(sta.inner.lock().state, StaState::None);
        assert!(h.mvm.stations.get(sta.sta_id).is_some());
    }

    #[test]
    fn tdls_peer_is_not_ap_sta() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let vif = h.mvm.mac_ctxt_init(&mut st, &h.vif_params(VifType::Station)).expect("init");
        let sta = h.mvm.add_sta(&mut st, vif, &PeerSta::tdls(PEER)).expect("add sta");
        assert_eq!(st.vif(vif).expect("vif").ap_sta_id, None);
        assert_eq!(h.mvm.stations.tdls_count(Some(vif)), 1);
        assert!(sta.tdls);
    }

    #[test]
    fn rejected_add_frees_slot() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let vif = h.mvm.mac_ctxt_init(&mut st, &h.vif_params(VifType::Station)).expect("init");
        let used = h.mvm.stations.used();
        h.trans.reject(CommandId::AddSta, 1);
        assert_matches!(
            h.mvm.add_sta(&mut st, vif, &PeerSta::new(PEER)),
            Err(Error::FirmwareRejected { .. })
        );
        assert_eq!(h.mvm.stations.used(), used);
        assert_eq!(st.vif(vif).expect("vif").ap_sta_id, None);
    }

    #[test]
    fn table_full() {
        let table = StationTable::new();
        for _ in 0..STATION_COUNT {
            table.reserve_internal().expect("free slot");
        }
        assert_matches!(table.reserve_internal(), Err(Error::ResourceExhausted(_)));
        table.release(StaId(5));
        assert_eq!(table.reserve_internal().expect("slot 5 freed"), StaId(5));
    }

    #[test]
    fn hidden_station_invisible_to_rx_path() {
        let h = TestHelper::started();
        let (vif, sta) = station(&h);
        h.mvm.stations.hide(sta.sta_id);
        assert!(h.mvm.stations.get(sta.sta_id).is_none());
        assert!(h.mvm.stations.find(vif, &PEER).is_some());
    }

    #[test]
    fn rm_sta_drains_then_removes() {
        let h = TestHelper::started();
        let (vif, sta) = station(&h);
        h.mvm.sta_tx_agg_start(&sta, 0).expect("start");
        let mask = sta.inner.lock().tfd_queue_msk;
        let free_before = h.mvm.queues.lock().available();

        let mut st = h.mvm.state.lock();
        h.mvm.rm_sta(&mut st, &sta).expect("rm");
        assert_eq!(h.trans.state.lock().flushed, vec![mask]);
        assert_eq!(h.trans.state.lock().waited_empty, vec![mask]);
        assert_eq!(h.trans.sent_ids(), vec![CommandId::RemoveSta]);
        assert_eq!(h.mvm.queues.lock().available(), free_before + 1);
        assert_eq!(sta.inner.lock().tid[0].state, TidAggState::Off);
        assert_eq!(st.vif(vif).expect("vif").ap_sta_id, None);
        assert!(h.mvm.stations.find(vif, &PEER).is_none());
    }

    #[test]
    fn rx_agg_session_cap() {
        let h = TestHelper::with_config(crate::config::MvmConfig {
            max_rx_ba_sessions: 1,
            ..Default::default()
        });
        let (_, sta) = station(&h);
        let mut st = h.mvm.state.lock();
        h.mvm.sta_rx_agg(&mut st, &sta, 0, 10, true).expect("first session");
        assert_matches!(
            h.mvm.sta_rx_agg(&mut st, &sta, 1, 10, true),
            Err(Error::ResourceExhausted(_))
        );
        h.mvm.sta_rx_agg(&mut st, &sta, 0, 0, false).expect("stop");
        assert_eq!(st.rx_ba_sessions, 0);
        assert_matches!(
            &h.trans.drain_commands()[..],
            [
                HostCommand::AddSta(AddStaCmd { add_immediate_ba_tid: Some((0, 10)), .. }),
                HostCommand::AddSta(AddStaCmd { remove_immediate_ba_tid: Some(0), .. }),
            ]
        );
    }

    #[test]
    fn tx_agg_full_session() {
        let h = TestHelper::started();
        let (_, sta) = station(&h);
        sta.inner.lock().tid[3].seq_number = 77;

        assert_eq!(h.mvm.sta_tx_agg_start(&sta, 3).expect("start"), 77);
        assert_eq!(h.stack.drain_events(), vec![StackEvent::StartTxBaReady { addr: PEER, tid: 3 }]);
        assert_matches!(h.mvm.sta_tx_agg_start(&sta, 3), Err(Error::InvalidTransition(_)));

        h.mvm.sta_tx_agg_oper(&sta, 3, 32).expect("oper");
        let queue = sta.inner.lock().tid[3].txq.expect("agg queue");
        assert_eq!(sta.inner.lock().tid[3].state, TidAggState::On);
        assert_ne!(sta.inner.lock().tfd_queue_msk & (1 << queue), 0);
        assert_eq!(
            h.trans.sent_ids(),
            vec![CommandId::ScdQueueConfig, CommandId::AddSta]
        );

        h.mvm.sta_tx_agg_stop(&sta, 3).expect("stop");
        assert_eq!(sta.inner.lock().tid[3].state, TidAggState::Off);
        assert_eq!(sta.inner.lock().tfd_queue_msk & (1 << queue), 0);
        assert_eq!(h.stack.drain_events(), vec![StackEvent::StopTxBaReady { addr: PEER, tid: 3 }]);
    }

    #[test]
    fn tx_agg_start_with_queued_frames_waits_for_drain() {
        let h = TestHelper::started();
        let (_, sta) = station(&h);
        h.mvm.sta_tx_queued(&sta, 2);
        h.mvm.sta_tx_queued(&sta, 2);

        h.mvm.sta_tx_agg_start(&sta, 2).expect("start");
        assert_eq!(sta.inner.lock().tid[2].state, TidAggState::EmptyingQueueForAddba);
        assert!(h.stack.drain_events().is_empty());

        h.mvm.rx_tx_response(&Packet::tx_response(sta.sta_id, 2, 1));
        assert!(h.stack.drain_events().is_empty());
        h.mvm.rx_tx_response(&Packet::tx_response(sta.sta_id, 2, 1));
        assert_eq!(sta.inner.lock().tid[2].state, TidAggState::Starting);
        assert_eq!(h.stack.drain_events(), vec![StackEvent::StartTxBaReady { addr: PEER, tid: 2 }]);
    }

    #[test]
    fn double_stop_never_double_frees() {
        let h = TestHelper::started();
        let (_, sta) = station(&h);
        h.mvm.sta_tx_agg_start(&sta, 1).expect("start");
        h.mvm.sta_tx_agg_oper(&sta, 1, 64).expect("oper");
        h.mvm.sta_tx_queued(&sta, 1);
        let free_with_session = h.mvm.queues.lock().available();
        h.stack.drain_events();

        h.mvm.sta_tx_agg_stop(&sta, 1).expect("first stop");
        assert_eq!(sta.inner.lock().tid[1].state, TidAggState::EmptyingQueueForDelba);
        assert_matches!(h.mvm.sta_tx_agg_stop(&sta, 1), Err(Error::InvalidTransition(_)));

        h.mvm.rx_tx_response(&Packet::tx_response(sta.sta_id, 1, 1));
        assert_eq!(sta.inner.lock().tid[1].state, TidAggState::Off);
        assert_eq!(h.mvm.queues.lock().available(), free_with_session + 1);
        assert_eq!(h.stack.drain_events(), vec![StackEvent::StopTxBaReady { addr: PEER, tid: 1 }]);

        assert_matches!(h.mvm.sta_tx_agg_stop(&sta, 1), Err(Error::InvalidTransition(_)));
        assert_eq!(h.mvm.queues.lock().available(), free_with_session + 1);
        let async_disables = h
            .trans
            .state
            .lock()
            .sent
            .iter()
            .filter(|s| s.is_async && s.cmd.id() == CommandId::ScdQueueConfig)
            .count();
        assert_eq!(async_disables, 1);
    }

    #[test]
    fn flush_releases_queue() {
        let h = TestHelper::started();
        let (_, sta) = station(&h);
        h.mvm.sta_tx_agg_start(&sta, 4).expect("start");
        h.mvm.sta_tx_agg_oper(&sta, 4, 64).expect("oper");
        let queue = sta.inner.lock().tid[4].txq.expect("queue");
        let free = h.mvm.queues.lock().available();

        h.mvm.sta_tx_agg_flush(&sta, 4).expect("flush");
        assert_eq!(h.trans.state.lock().flushed, vec![1 << queue]);
        assert_eq!(h.mvm.queues.lock().available(), free + 1);
        assert_matches!(h.mvm.sta_tx_agg_flush(&sta, 4), Err(Error::InvalidTransition(_)));
    }

    #[test]
    fn sleep_reports_buffered_tids() {
        let h = TestHelper::started();
        let (_, sta) = station(&h);
        h.mvm.sta_tx_agg_start(&sta, 5).expect("start");
        h.mvm.sta_tx_agg_oper(&sta, 5, 64).expect("oper");
        h.mvm.sta_tx_queued(&sta, 5);
        h.mvm.sta_tx_queued(&sta, 0);
        h.stack.drain_events();
        h.trans.clear();

        h.mvm.sta_notify_sleep(&sta);
        assert_eq!(
            h.stack.drain_events(),
            vec![
                StackEvent::BlockAwake { addr: PEER, block: true },
                StackEvent::SetBuffered { addr: PEER, tid: 5, buffered: true },
            ]
        );

        h.mvm.rx_tx_response(&Packet::tx_response(sta.sta_id, 5, 1));
        assert_eq!(
            h.stack.drain_events(),
            vec![StackEvent::SetBuffered { addr: PEER, tid: 5, buffered: false }]
        );

        h.mvm.sta_notify_awake(&sta).expect("awake");
        assert!(!sta.inner.lock().asleep);
        assert_matches!(
            &h.trans.drain_commands()[..],
            [HostCommand::AddSta(AddStaCmd { awake: true, modify: true, .. })]
        );
    }

    #[test]
    fn sleep_tx_count() {
        let h = TestHelper::started();
        let (_, sta) = station(&h);
        h.mvm.sta_modify_sleep_tx_count(&sta, 2, 0b11).expect("release frames");
        assert_matches!(
            &h.trans.drain_commands()[..],
            [HostCommand::AddSta(AddStaCmd { sleep_tx_count: Some((2, 3)), awake: false, .. })]
        );
    }

    #[test]
    fn tdls_teardown_asks_for_every_peer() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let vif = h.mvm.mac_ctxt_init(&mut st, &h.vif_params(VifType::Station)).expect("init");
        h.mvm.add_sta(&mut st, vif, &PeerSta::new(PEER)).expect("ap");
        h.mvm.add_sta(&mut st, vif, &PeerSta::tdls([2, 0, 0, 0, 0, 9])).expect("tdls");
        h.mvm.teardown_tdls_peers();
        assert_eq!(
            h.stack.drain_events(),
            vec![StackEvent::TdlsTeardown { vif, addr: [2, 0, 0, 0, 0, 9] }]
        );
    }

    #[test]
    fn bcast_sta_lifecycle() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let vif = h.mvm.mac_ctxt_init(&mut st, &h.vif_params(VifType::Ap)).expect("init");
        let used = h.mvm.stations.used();
        h.trans.clear();

        h.mvm.add_bcast_sta(&mut st, vif).expect("add bcast");
        let bcast = st.vif(vif).expect("vif").bcast_sta.expect("bcast id");
        assert!(h.mvm.stations.get(bcast).is_none());
        assert_eq!(h.mvm.stations.used(), used + 1);

        h.mvm.rm_bcast_sta(&mut st, vif).expect("rm bcast");
        assert_eq!(st.vif(vif).expect("vif").bcast_sta, None);
        assert_eq!(h.mvm.stations.used(), used);
        assert_eq!(h.trans.sent_ids(), vec![CommandId::AddSta, CommandId::RemoveSta]);
    }
}
