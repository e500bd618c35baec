// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Operations the upper wireless stack invokes on the core.

use {
    crate::{
        error::Error,
        mcast::McastFilter,
        mvm::{Mvm, MvmState},
        refs::RefType,
        scan::ScanStatus,
        sta::Station,
        status::StatusFlags,
        time_event::{TeSlot, TimeEventKind},
        types::{
            Ac, AmpduAction, AmpduParams, BssChanged, BssConf, ChanDef, ChanctxChanged,
            ChanctxConf, ChanctxSwitchMode, Channel, Cipher, KeyCommand, KeyConf, KeyFlags,
            MacAddr, PeerSta, PhyCtxtId, RocType, ScanRequest, SchedScanRequest, StaId,
            StaNotify, StaState, TxFrame, TxQueueParams, VifId, VifParams, VifType,
            MIN_BEACON_INTERVAL, OFFCHANNEL_QUEUE, TDLS_STA_COUNT,
        },
    },
    log::{debug, error, info, warn},
    std::{cmp::min, sync::Arc},
};

/// Session protection bounds while associating, in TU.
pub const TE_SESSION_PROTECTION_MAX_TIME_MS: u32 = 500;
pub const TE_SESSION_PROTECTION_MIN_TIME_MS: u32 = 400;

/// Callbacks of the upper wireless stack. Implemented once, by `Mvm`.
pub trait MacOps {
    /// Boots the firmware. During a hardware restart, first drops everything the old firmware
    /// owned.
    fn start(&self) -> Result<(), Error>;
    fn stop(&self);
    /// The upper stack has replayed its configuration after a hardware restart.
    fn restart_complete(&self);

    fn add_interface(&self, params: &VifParams) -> Result<VifId, Error>;
    fn remove_interface(&self, vif: VifId);
    fn bss_info_changed(&self, vif: VifId, conf: &BssConf, changed: BssChanged);
    fn start_ap(&self, vif: VifId) -> Result<(), Error>;
    fn stop_ap(&self, vif: VifId);
    fn join_ibss(&self, vif: VifId) -> Result<(), Error> {
        self.start_ap(vif)
    }
    fn leave_ibss(&self, vif: VifId) {
        self.stop_ap(vif)
    }
    fn conf_tx(&self, vif: VifId, ac: Ac, params: &TxQueueParams) -> Result<(), Error>;

    fn sta_state(
        &self,
        vif: VifId,
        peer: &PeerSta,
        old: StaState,
        new: StaState,
    ) -> Result<(), Error>;
    fn sta_notify(&self, vif: VifId, addr: MacAddr, cmd: StaNotify);
    fn sta_pre_rcu_remove(&self, vif: VifId, addr: MacAddr);
    fn allow_buffered_frames(&self, vif: VifId, addr: MacAddr, tids: u8, num_frames: u16);
    fn release_buffered_frames(&self, vif: VifId, addr: MacAddr, tids: u8, num_frames: u16);
    fn ampdu_action(
        &self,
        vif: VifId,
        addr: MacAddr,
        params: &mut AmpduParams,
    ) -> Result<(), Error>;

    fn hw_scan(&self, vif: VifId, req: &ScanRequest) -> Result<(), Error>;
    fn cancel_hw_scan(&self, vif: VifId);
    fn sched_scan_start(&self, vif: VifId, req: &SchedScanRequest) -> Result<(), Error>;
    fn sched_scan_stop(&self, vif: VifId) -> Result<(), Error>;

    fn remain_on_channel(
        &self,
        vif: VifId,
        chan: Channel,
        duration_ms: u32,
        roc_type: RocType,
    ) -> Result<(), Error>;
    fn cancel_remain_on_channel(&self);
    fn mgd_prepare_tx(&self, vif: VifId);
    fn mgd_protect_tdls_discover(&self, vif: VifId);

    fn add_chanctx(&self, conf: &ChanctxConf) -> Result<PhyCtxtId, Error>;
    fn remove_chanctx(&self, ctx: PhyCtxtId);
    fn change_chanctx(
        &self,
        ctx: PhyCtxtId,
        conf: &ChanctxConf,
        changed: ChanctxChanged,
    ) -> Result<(), Error>;
    fn assign_vif_chanctx(&self, vif: VifId, ctx: PhyCtxtId) -> Result<(), Error>;
    fn unassign_vif_chanctx(&self, vif: VifId, ctx: PhyCtxtId);
    /// Moves `vif` off `old`. Returns the context it ends up on.
    fn switch_vif_chanctx(
        &self,
        vif: VifId,
        old: PhyCtxtId,
        mode: ChanctxSwitchMode,
    ) -> Result<PhyCtxtId, Error>;
    fn channel_switch_beacon(&self, vif: VifId, chandef: ChanDef) -> Result<(), Error>;

    fn flush(&self, vif: Option<VifId>, drop: bool);
    fn prepare_multicast(&self, addrs: &[MacAddr]) -> McastFilter;
    fn configure_filter(&self, allmulti: bool, filter: Option<McastFilter>);
    fn set_key(
        &self,
        cmd: KeyCommand,
        vif: VifId,
        sta: Option<MacAddr>,
        key: &mut KeyConf,
    ) -> Result<(), Error>;
    fn set_tim(&self, vif: VifId, addr: MacAddr) -> Result<(), Error>;
    fn set_rts_threshold(&self, value: u32) -> Result<(), Error>;
    fn tx(&self, frame: TxFrame);
}

enum TxTarget {
    Station(Arc<Station>),
    NonStation(Option<StaId>),
}

impl Mvm {
    /// Runs `f` with the device held out of low power through `ref_type`.
    fn with_ref<T>(
        &self,
        ref_type: RefType,
        f: impl FnOnce() -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.refs.acquire_sync(ref_type)?;
        let result = f();
        self.refs.release(ref_type);
        result
    }

    fn add_interface_locked(&self, st: &mut MvmState, params: &VifParams) -> Result<VifId, Error> {
        let vif_id = self.mac_ctxt_init(st, params)?;
        let counted = params.vif_type != VifType::P2pDevice;
        if counted {
            st.vif_count += 1;
        }
        let result = if params.vif_type.is_beaconing() {
            // The MAC context needs the beacon template and the binding needs the MAC context,
            // so both wait for start_ap.
            self.alloc_bcast_sta(st, vif_id)
        } else {
            self.upload_vif(st, vif_id)
        };
        if let Err(e) = result {
            error!("failed to add {:?} interface: {}", params.vif_type, e);
            if counted {
                st.vif_count -= 1;
            }
            self.mac_ctxt_release(st, vif_id);
            return Err(e);
        }
        info!("MAC {} ({:?}) added", vif_id.0, params.vif_type);
        Ok(vif_id)
    }

    fn upload_vif(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        self.mac_ctxt_add(st, vif_id)?;
        if let Err(e) = self.configure_uploaded_vif(st, vif_id) {
            if let Err(e) = self.mac_ctxt_remove(st, vif_id) {
                error!("failed to remove MAC {} after failed add: {}", vif_id.0, e);
            }
            return Err(e);
        }
        Ok(())
    }

    fn configure_uploaded_vif(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        self.power_update_mac(st)?;
        self.disable_beacon_filter(st, vif_id)?;
        let vif_type = st.vif(vif_id)?.vif_type;
        if st.bf_allowed_vif.is_none() && vif_type == VifType::Station {
            st.bf_allowed_vif = Some(vif_id);
        }
        if vif_type == VifType::P2pDevice {
            if let Err(e) = self.setup_p2p_device(st, vif_id) {
                if st.bf_allowed_vif == Some(vif_id) {
                    st.bf_allowed_vif = None;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// The P2P device keeps a PHY context of its own, tuned to the last remain-on-channel.
    fn setup_p2p_device(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let phy = st.phy_ctxts.get_free()?;
        st.phy_ctxts.ref_ctxt(phy)?;
        st.vif_mut(vif_id)?.phy_ctxt = Some(phy);
        if let Err(e) = self.bind_p2p_device(st, vif_id) {
            if let Err(e) = st.phy_ctxts.unref_ctxt(phy) {
                error!("{}", e);
            }
            st.vif_mut(vif_id)?.phy_ctxt = None;
            return Err(e);
        }
        st.p2p_device_vif = Some(vif_id);
        Ok(())
    }

    fn bind_p2p_device(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        self.binding_add_vif(st, vif_id)?;
        if let Err(e) = self.add_bcast_sta(st, vif_id) {
            if let Err(e) = self.binding_remove_vif(st, vif_id) {
                error!("failed to unbind P2P device: {}", e);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Cancels every time event of an interface that is going away.
    fn cancel_vif_time_events(&self, vif_id: VifId) {
        let (session, aux) = {
            let table = self.time_events.lock();
            (table.get(vif_id, TeSlot::Session).kind, table.get(vif_id, TeSlot::Aux).kind)
        };
        let roc = match session {
            Some(TimeEventKind::P2pRoc(_)) => true,
            _ => aux.is_some(),
        };
        if session.is_some() {
            if let Err(e) = self.remove_time_event(vif_id, TeSlot::Session) {
                warn!("failed to remove time event of MAC {}: {}", vif_id.0, e);
            }
        }
        if aux.is_some() {
            if let Err(e) = self.remove_time_event(vif_id, TeSlot::Aux) {
                warn!("failed to remove aux time event of MAC {}: {}", vif_id.0, e);
            }
        }
        if roc {
            self.roc_finished();
        }
    }

    /// Empties the interface's transmit queues ahead of taking it down. Called without the
    /// device mutex.
    fn prepare_mac_removal(&self, vif_id: VifId) {
        let (vif_type, mask) = match self.state.lock().vif(vif_id) {
            Ok(vif) => (vif.vif_type, vif.queues_mask()),
            Err(_) => return,
        };
        if vif_type == VifType::P2pDevice {
            // The remain-on-channel completion flushes the off-channel queue.
            self.process_async_handlers();
            return;
        }
        let drained = self
            .trans
            .flush_tx_path(mask)
            .and_then(|()| self.trans.wait_tx_queue_empty(mask, self.config.cmd_timeout()));
        if let Err(e) = drained {
            warn!("failed to drain queues of MAC {}: {}", vif_id.0, e);
        }
    }

    fn bss_info_changed_station(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        conf: &BssConf,
        changed: BssChanged,
    ) -> Result<(), Error> {
        let vif_type = {
            let vif = st.vif_mut(vif_id)?;
            vif.bss_conf = conf.clone();
            vif.associated = conf.assoc;
            // Keep the old BSSID until the MAC is told it is no longer associated.
            if conf.assoc {
                vif.bssid = conf.bssid;
            }
            vif.vif_type
        };
        if let Err(e) = self.mac_ctxt_changed(st, vif_id, false) {
            error!("failed to update MAC {}: {}", vif_id.0, e);
        }

        if changed.contains(BssChanged::ASSOC) {
            if conf.assoc {
                self.update_quotas(st, None)?;
                if self.status.test(StatusFlags::IN_HW_RESTART) {
                    // The new firmware lost sync with the AP; make sure it hears a beacon.
                    let dur = 11 * u32::from(conf.beacon_int) / 10;
                    if let Err(e) = self.protect_session(vif_id, dur, dur, 5 * dur, false) {
                        warn!("failed to protect session after restart: {}", e);
                    }
                }
                if vif_type == VifType::P2pClient {
                    self.refs.acquire(RefType::P2pClient);
                }
            } else if let Some(ap_sta_id) = st.vif(vif_id)?.ap_sta_id {
                if let Err(e) = self.rm_sta_id(st, vif_id, ap_sta_id) {
                    error!("failed to remove AP station: {}", e);
                }
                self.forget_d0i3_ap_sta(ap_sta_id);
                if let Err(e) = self.update_quotas(st, None) {
                    error!("failed to update quotas: {}", e);
                }
                if vif_type == VifType::P2pClient {
                    self.refs.release(RefType::P2pClient);
                }
                st.vif_mut(vif_id)?.bssid = conf.bssid;
                if let Err(e) = self.mac_ctxt_changed(st, vif_id, false) {
                    error!("failed to clear BSSID of MAC {}: {}", vif_id.0, e);
                }
            }
            self.recalc_multicast(st);
        } else if changed.contains(BssChanged::BEACON_INFO) {
            // A beacon arrived after association; the protection is no longer needed.
            if let Err(e) = self.stop_session_protection(vif_id) {
                warn!("failed to stop session protection: {}", e);
            }
        }

        if changed.contains(BssChanged::BEACON_INFO) {
            if let Err(e) = self.enable_beacon_filter(st, vif_id) {
                warn!("failed to enable beacon filter: {}", e);
            }
        }
        if changed.intersects(BssChanged::PS | BssChanged::P2P_PS | BssChanged::QOS) {
            if let Err(e) = self.power_update_mac(st) {
                error!("failed to update power mode: {}", e);
            }
        }
        if changed.contains(BssChanged::TXPOWER) {
            if let Err(e) = self.set_tx_power(st, vif_id, conf.txpower) {
                error!("failed to set tx power: {}", e);
            }
        }
        if changed.contains(BssChanged::CQM) && st.vif(vif_id)?.bf_enabled {
            if let Err(e) = self.enable_beacon_filter(st, vif_id) {
                error!("failed to update CQM thresholds: {}", e);
            }
        }
        Ok(())
    }

    fn bss_info_changed_ap_ibss(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        conf: &BssConf,
        changed: BssChanged,
    ) -> Result<(), Error> {
        {
            let vif = st.vif_mut(vif_id)?;
            vif.bss_conf = conf.clone();
            // Applied by start_ap otherwise.
            if !vif.ap_ibss_active {
                return Ok(());
            }
        }
        if changed.intersects(
            BssChanged::ERP_CTS_PROT | BssChanged::HT | BssChanged::BANDWIDTH | BssChanged::QOS,
        ) {
            if let Err(e) = self.mac_ctxt_changed(st, vif_id, false) {
                error!("failed to update MAC {}: {}", vif_id.0, e);
            }
        }
        if changed.contains(BssChanged::BEACON) {
            if let Err(e) = self.mac_ctxt_beacon_changed(st, vif_id) {
                warn!("failed to update beacon: {}", e);
            }
        }
        if changed.contains(BssChanged::TXPOWER) {
            if let Err(e) = self.set_tx_power(st, vif_id, conf.txpower) {
                error!("failed to set tx power: {}", e);
            }
        }
        Ok(())
    }

    fn start_ap_locked(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let vif_type = st.vif(vif_id)?.vif_type;
        if !vif_type.is_beaconing() {
            return Err(Error::InvalidArgument("not an AP or IBSS interface"));
        }
        self.mac_ctxt_beacon_changed(st, vif_id)?;
        self.mac_ctxt_add(st, vif_id)?;
        if let Err(e) = self.activate_ap(st, vif_id) {
            if let Err(e) = self.mac_ctxt_remove(st, vif_id) {
                error!("failed to remove MAC {}: {}", vif_id.0, e);
            }
            return Err(e);
        }
        if vif_type == VifType::P2pGo {
            self.update_p2p_device_mac(st);
        }
        self.refs.acquire(RefType::ApIbss);
        // TDLS is not supported while more than one channel is in use.
        if st.phy_ctxts.active_count() > 1 {
            self.teardown_tdls_peers();
        }
        info!("MAC {} beaconing", vif_id.0);
        Ok(())
    }

    fn activate_ap(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        self.binding_add_vif(st, vif_id)?;
        if let Err(e) = self.activate_bound_ap(st, vif_id) {
            if let Err(e) = self.binding_remove_vif(st, vif_id) {
                error!("failed to unbind MAC {}: {}", vif_id.0, e);
            }
            return Err(e);
        }
        Ok(())
    }

    fn activate_bound_ap(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        self.send_add_bcast_sta(st, vif_id)?;
        // Must be set before the quota is computed.
        st.vif_mut(vif_id)?.ap_ibss_active = true;
        if let Err(e) = self.power_update_mac(st) {
            error!("failed to update power mode: {}", e);
        }
        if let Err(e) = self.update_quotas(st, None) {
            st.vif_mut(vif_id)?.ap_ibss_active = false;
            if let Err(e) = self.power_update_mac(st) {
                error!("failed to update power mode: {}", e);
            }
            if let Err(e) = self.send_rm_bcast_sta(st, vif_id) {
                error!("failed to remove broadcast station: {}", e);
            }
            return Err(e);
        }
        Ok(())
    }

    /// The P2P device MAC tracks whether a GO is running.
    fn update_p2p_device_mac(&self, st: &mut MvmState) {
        if let Some(p2p) = st.p2p_device_vif {
            if let Err(e) = self.mac_ctxt_changed(st, p2p, false) {
                error!("failed to update P2P device MAC: {}", e);
            }
        }
    }

    fn sta_state_locked(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        peer: &PeerSta,
        old: StaState,
        new: StaState,
    ) -> Result<(), Error> {
        let (vif_type, beacon_int, phy) = {
            let vif = st.vif(vif_id)?;
            let phy = vif.phy_ctxt.ok_or_else(|| {
                Error::violation(format!("station transition on MAC {} without channel", vif_id.0))
            })?;
            (vif.vif_type, vif.bss_conf.beacon_int, phy)
        };
        let sta = self.stations.find(vif_id, &peer.addr);
        let tracked = sta.as_ref().map_or(StaState::NotExist, |sta| sta.inner.lock().state);
        if tracked != old {
            return Err(Error::InvalidTransition(format!(
                "station {:02x?} is {:?}, not {:?}",
                peer.addr, tracked, old
            )));
        }
        let illegal =
            || Error::InvalidTransition(format!("{:?} -> {:?} for {:02x?}", old, new, peer.addr));

        match (old, new) {
            (StaState::NotExist, StaState::None) => {
                // Firmware crashes on such short beacon intervals.
                if vif_type.is_managed() && beacon_int < MIN_BEACON_INTERVAL {
                    error!("AP {:02x?} beacon interval is {}, refusing", peer.addr, beacon_int);
                    return Err(Error::Refused(format!("beacon interval {}", beacon_int)));
                }
                if peer.tdls
                    && (vif_type.is_p2p()
                        || self.stations.tdls_count(None) >= TDLS_STA_COUNT
                        || st.phy_ctxts.active_count() > 1)
                {
                    debug!("refusing TDLS station {:02x?}", peer.addr);
                    return Err(Error::Busy("TDLS peer"));
                }
                self.add_sta(st, vif_id, peer)?;
                if peer.tdls {
                    if let Err(e) = self.recalc_tdls_state(st, vif_id, true) {
                        error!("failed to recalculate TDLS state: {}", e);
                    }
                }
                return Ok(());
            }
            (StaState::None, StaState::NotExist) => {
                let sta = sta.ok_or_else(illegal)?;
                let result = self.rm_sta(st, &sta);
                if sta.tdls {
                    if let Err(e) = self.recalc_tdls_state(st, vif_id, false) {
                        error!("failed to recalculate TDLS state: {}", e);
                    }
                }
                return result;
            }
            (StaState::None, StaState::Auth) => {
                // The environment may have changed; give energy-based scanning another try.
                st.last_ebs_successful = true;
            }
            (StaState::Auth, StaState::Assoc) => {
                let sta = sta.as_ref().ok_or_else(illegal)?;
                self.update_sta(sta)?;
                let band = st.phy_ctxts.get(phy)?.def.chan.band;
                self.rate_ctrl.init_rates(sta.sta_id, band, true);
            }
            (StaState::Assoc, StaState::Authorized) => {
                if st.phy_ctxts.active_count() > 1 {
                    self.teardown_tdls_peers();
                }
                if let Err(e) = self.enable_beacon_filter(st, vif_id) {
                    warn!("failed to enable beacon filter: {}", e);
                }
            }
            (StaState::Authorized, StaState::Assoc) => {
                if let Err(e) = self.disable_beacon_filter(st, vif_id) {
                    warn!("failed to disable beacon filter: {}", e);
                }
            }
            (StaState::Assoc, StaState::Auth) | (StaState::Auth, StaState::None) => (),
            _ => return Err(illegal()),
        }
        if let Some(sta) = sta {
            sta.inner.lock().state = new;
        }
        Ok(())
    }

    fn ampdu_action_locked(
        &self,
        vif_id: VifId,
        addr: &MacAddr,
        params: &mut AmpduParams,
    ) -> Result<(), Error> {
        let mut st = self.state.lock();
        let sta = self.stations.find(vif_id, addr).ok_or(Error::InvalidArgument("station"))?;
        let tid = params.tid;
        match params.action {
            AmpduAction::RxStart => {
                if !self.config.rx_agg_enabled {
                    return Err(Error::InvalidArgument("rx aggregation disabled"));
                }
                self.sta_rx_agg(&mut st, &sta, tid, params.ssn, true)
            }
            AmpduAction::RxStop => self.sta_rx_agg(&mut st, &sta, tid, 0, false),
            AmpduAction::TxStart => {
                if !self.config.tx_agg_enabled {
                    return Err(Error::InvalidArgument("tx aggregation disabled"));
                }
                params.ssn = self.sta_tx_agg_start(&sta, tid)?;
                Ok(())
            }
            AmpduAction::TxStopCont => self.sta_tx_agg_stop(&sta, tid),
            AmpduAction::TxStopFlush | AmpduAction::TxStopFlushCont => {
                self.sta_tx_agg_flush(&sta, tid)
            }
            AmpduAction::TxOperational => self.sta_tx_agg_oper(&sta, tid, params.buf_size),
        }
    }

    /// Tunes the P2P device to `chan`: joins a context already there, retunes its own context
    /// if nobody shares it, or moves to a fresh one.
    fn p2p_device_set_channel(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        chan: Channel,
    ) -> Result<(), Error> {
        let current = st.vif(vif_id)?.phy_ctxt.ok_or_else(|| {
            Error::violation(format!("P2P device {} has no PHY context", vif_id.0))
        })?;
        if let Some(shared) = st.phy_ctxts.find_on_channel(chan, Some(current)) {
            debug!("P2P device joins PHY context {}", shared.0);
            return self.rebind_vif(st, vif_id, current, shared);
        }
        let ctxt = st.phy_ctxts.get(current)?;
        if ctxt.def.chan == chan {
            return Ok(());
        }
        let conf = ChanctxConf::new(ChanDef::no_ht(chan));
        if ctxt.ref_count == 1 {
            return self.phy_ctxt_changed(st, current, &conf);
        }
        let fresh = st.phy_ctxts.get_free()?;
        self.phy_ctxt_changed(st, fresh, &conf)?;
        self.rebind_vif(st, vif_id, current, fresh)
    }

    /// Moves an interface's binding and PHY reference from one context to another. On failure
    /// the interface is put back on `from`.
    fn rebind_vif(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        from: PhyCtxtId,
        to: PhyCtxtId,
    ) -> Result<(), Error> {
        if let Err(err) = self.binding_remove_vif(st, vif_id) {
            error!("failed to unbind MAC {} from PHY {}: {}", vif_id.0, from.0, err);
            self.restore_binding(st, vif_id);
            return Err(err);
        }
        st.phy_ctxts.unref_ctxt(from)?;
        st.phy_ctxts.ref_ctxt(to)?;
        st.vif_mut(vif_id)?.phy_ctxt = Some(to);
        if let Err(err) = self.binding_add_vif(st, vif_id) {
            error!("failed to bind MAC {} to PHY {}: {}", vif_id.0, to.0, err);
            st.phy_ctxts.unref_ctxt(to)?;
            st.phy_ctxts.ref_ctxt(from)?;
            st.vif_mut(vif_id)?.phy_ctxt = Some(from);
            self.restore_binding(st, vif_id);
            return Err(err);
        }
        Ok(())
    }

    /// Re-binds an interface to the PHY context it references. Restarts the hardware when the
    /// firmware refuses, since the interface is left without a binding.
    fn restore_binding(&self, st: &mut MvmState, vif_id: VifId) {
        if let Err(e) = self.binding_add_vif(st, vif_id) {
            error!("failed to restore binding of MAC {}: {}", vif_id.0, e);
            self.nic_restart();
        }
    }

    /// Configures a context for `conf` and takes the first reference. `prefer` is reused when
    /// still free.
    fn add_chanctx_locked(
        &self,
        st: &mut MvmState,
        conf: &ChanctxConf,
        prefer: Option<PhyCtxtId>,
    ) -> Result<PhyCtxtId, Error> {
        let id = match prefer {
            Some(id) if st.phy_ctxts.get(id)?.ref_count == 0 => id,
            _ => st.phy_ctxts.get_free()?,
        };
        self.phy_ctxt_changed(st, id, conf)?;
        st.phy_ctxts.ref_ctxt(id)?;
        Ok(id)
    }

    fn assign_vif_chanctx_locked(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        phy: PhyCtxtId,
        switching: bool,
    ) -> Result<(), Error> {
        st.phy_ctxts.get(phy)?;
        let vif_type = st.vif(vif_id)?.vif_type;
        // The P2P device manages its own context.
        if vif_type == VifType::P2pDevice {
            return Err(Error::InvalidArgument("P2P device takes no channel context"));
        }
        st.vif_mut(vif_id)?.phy_ctxt = Some(phy);
        let result = self.bind_assigned_vif(st, vif_id, vif_type, switching);
        if result.is_err() {
            st.vif_mut(vif_id)?.phy_ctxt = None;
        }
        result
    }

    fn bind_assigned_vif(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        vif_type: VifType,
        switching: bool,
    ) -> Result<(), Error> {
        match vif_type {
            VifType::Ap | VifType::P2pGo if switching => {
                st.vif_mut(vif_id)?.ap_ibss_active = true;
            }
            // Bound by start_ap once the beacon template exists.
            t if t.is_beaconing() => return Ok(()),
            t if t.is_managed() => (),
            VifType::Monitor => st.vif_mut(vif_id)?.ps_disabled = true,
            _ => return Err(Error::InvalidArgument("interface type takes no channel context")),
        }
        self.binding_add_vif(st, vif_id)?;
        // Power goes before quota, or the firmware complains.
        if let Err(e) = self.power_update_mac(st) {
            error!("failed to update power mode: {}", e);
        }
        let result = match vif_type {
            VifType::Monitor => {
                st.vif_mut(vif_id)?.monitor_active = true;
                self.update_quotas(st, None)
            }
            VifType::Ap | VifType::P2pGo => {
                if let Err(e) = self.update_quotas(st, None) {
                    error!("failed to update quotas: {}", e);
                }
                if let Err(e) = self.mac_ctxt_changed(st, vif_id, false) {
                    error!("failed to update MAC {}: {}", vif_id.0, e);
                }
                st.vif_mut(vif_id)?.csa_active = false;
                if st.csa_vif == Some(vif_id) {
                    st.csa_vif = None;
                }
                Ok(())
            }
            _ if switching => self.protect_switched_session(st, vif_id),
            _ => Ok(()),
        };
        if let Err(e) = result {
            if vif_type == VifType::Monitor {
                st.vif_mut(vif_id)?.monitor_active = false;
            }
            if let Err(e) = self.binding_remove_vif(st, vif_id) {
                error!("failed to unbind MAC {}: {}", vif_id.0, e);
            }
            if let Err(e) = self.power_update_mac(st) {
                error!("failed to update power mode: {}", e);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Keeps a station on its new channel until the first beacon there.
    fn protect_switched_session(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let beacon_int = u32::from(st.vif(vif_id)?.bss_conf.beacon_int);
        let duration = 2 * beacon_int;
        // Session protection reads the device clock.
        self.with_ref(RefType::ProtectCsa, || {
            if let Err(e) =
                self.protect_session(vif_id, duration, duration, beacon_int / 2, true)
            {
                warn!("failed to protect session after channel switch: {}", e);
            }
            Ok(())
        })?;
        if let Err(e) = self.update_quotas(st, None) {
            error!("failed to update quotas: {}", e);
        }
        Ok(())
    }

    fn unassign_vif_chanctx_locked(&self, st: &mut MvmState, vif_id: VifId, switching: bool) {
        let (vif_type, ap_active) = match st.vif(vif_id) {
            Ok(vif) => (vif.vif_type, vif.ap_ibss_active),
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };
        if let Err(e) = self.remove_time_event(vif_id, TeSlot::Session) {
            warn!("failed to remove time event of MAC {}: {}", vif_id.0, e);
        }
        let mut disabled_vif = None;
        let bound = match vif_type {
            VifType::Adhoc => false,
            VifType::Ap | VifType::P2pGo => {
                // Only a channel switch unbinds a running AP here; stop_ap does otherwise.
                if switching && ap_active {
                    for sta in self.stations.peers().iter().filter(|sta| sta.vif == vif_id) {
                        if let Err(e) = self.sta_modify_disable_tx(sta, true) {
                            warn!("failed to block station {}: {}", sta.sta_id.0, e);
                        }
                    }
                    if let Ok(vif) = st.vif_mut(vif_id) {
                        vif.ap_ibss_active = false;
                    }
                    true
                } else {
                    false
                }
            }
            VifType::Monitor => {
                if let Ok(vif) = st.vif_mut(vif_id) {
                    vif.monitor_active = false;
                    vif.ps_disabled = false;
                }
                true
            }
            t if t.is_managed() && switching => {
                disabled_vif = Some(vif_id);
                if let Err(e) = self.mac_ctxt_changed(st, vif_id, true) {
                    error!("failed to update MAC {}: {}", vif_id.0, e);
                }
                true
            }
            _ => true,
        };
        if bound {
            if let Err(e) = self.update_quotas(st, disabled_vif) {
                error!("failed to update quotas: {}", e);
            }
            if let Err(e) = self.binding_remove_vif(st, vif_id) {
                error!("failed to unbind MAC {}: {}", vif_id.0, e);
            }
        }
        if let Ok(vif) = st.vif_mut(vif_id) {
            vif.phy_ctxt = None;
        }
        if let Err(e) = self.power_update_mac(st) {
            error!("failed to update power mode: {}", e);
        }
    }

    fn switch_swap_contexts(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        old: PhyCtxtId,
        new_conf: &ChanctxConf,
    ) -> Result<PhyCtxtId, Error> {
        let old_conf = st.phy_ctxts.get(old)?.conf();
        self.unassign_vif_chanctx_locked(st, vif_id, true);
        if let Err(e) = st.phy_ctxts.unref_ctxt(old) {
            error!("{}", e);
        }

        let err = match self.add_chanctx_locked(st, new_conf, None) {
            Ok(new) => match self.assign_vif_chanctx_locked(st, vif_id, new, true) {
                Ok(()) => {
                    if st.phy_ctxts.active_count() > 1 {
                        self.teardown_tdls_peers();
                    }
                    return Ok(new);
                }
                Err(e) => {
                    error!("failed to assign new context during channel switch: {}", e);
                    if let Err(e) = st.phy_ctxts.unref_ctxt(new) {
                        error!("{}", e);
                    }
                    e
                }
            },
            Err(e) => {
                error!("failed to add new context during channel switch: {}", e);
                e
            }
        };

        let restored = self
            .add_chanctx_locked(st, &old_conf, Some(old))
            .and_then(|id| self.assign_vif_chanctx_locked(st, vif_id, id, true));
        if let Err(e) = restored {
            error!("failed to restore old context after channel switch failure: {}", e);
            self.nic_restart();
        }
        Err(err)
    }

    fn switch_reassign(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        old: PhyCtxtId,
        new: PhyCtxtId,
    ) -> Result<PhyCtxtId, Error> {
        self.unassign_vif_chanctx_locked(st, vif_id, true);
        match self.assign_vif_chanctx_locked(st, vif_id, new, true) {
            Ok(()) => Ok(new),
            Err(err) => {
                error!("failed to assign new context during channel switch: {}", err);
                if let Err(e) = self.assign_vif_chanctx_locked(st, vif_id, old, true) {
                    error!("failed to reassign old context after failure: {}", e);
                    self.nic_restart();
                }
                Err(err)
            }
        }
    }

    fn tx_target(&self, frame: &TxFrame) -> Option<TxTarget> {
        let st = self.state.lock();
        let vif = match st.vif(frame.vif) {
            Ok(vif) => vif,
            Err(_) => {
                warn!("frame for unknown MAC {}", frame.vif.0);
                return None;
            }
        };
        if frame.hw_queue == OFFCHANNEL_QUEUE {
            let sta_id = if vif.vif_type == VifType::P2pDevice { vif.bcast_sta } else { st.aux_sta };
            return Some(TxTarget::NonStation(sta_id));
        }
        // Non-bufferable management frames go out as if broadcast while the peer sleeps.
        let peer = if frame.no_ps_buffer_mgmt {
            None
        } else {
            frame.sta.and_then(|addr| self.stations.find(vif.id, &addr))
        };
        let sta = peer.or_else(|| {
            if vif.vif_type.is_managed() {
                vif.ap_sta_id.and_then(|id| self.stations.get(id))
            } else {
                None
            }
        });
        Some(match sta {
            Some(sta) => TxTarget::Station(sta),
            None => TxTarget::NonStation(vif.bcast_sta),
        })
    }
}

impl MacOps for Mvm {
    fn start(&self) -> Result<(), Error> {
        let mut st = self.state.lock();
        self.fw_start(&mut st)
    }

    fn stop(&self) {
        {
            let mut st = self.state.lock();
            self.fw_stop(&mut st);
        }
        // Anything queued after the purge finds the firmware down.
        self.process_async_handlers();
    }

    fn restart_complete(&self) {
        let mut st = self.state.lock();
        if !self.status.test_and_clear(StatusFlags::IN_HW_RESTART) {
            warn!("restart completion without a restart");
            return;
        }
        if let Err(e) = self.update_quotas(&mut st, None) {
            error!("failed to update quotas after restart: {}", e);
        }
        self.refs.release(RefType::UcodeDown);
        info!("hardware restart complete");
    }

    fn add_interface(&self, params: &VifParams) -> Result<VifId, Error> {
        self.with_ref(RefType::AddIf, || {
            let mut st = self.state.lock();
            self.add_interface_locked(&mut st, params)
        })
    }

    fn remove_interface(&self, vif_id: VifId) {
        self.cancel_vif_time_events(vif_id);
        self.prepare_mac_removal(vif_id);

        let mut st = self.state.lock();
        let st = &mut *st;
        let (vif_type, uploaded) = match st.vif(vif_id) {
            Ok(vif) => (vif.vif_type, vif.uploaded),
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };
        if st.bf_allowed_vif == Some(vif_id) {
            st.bf_allowed_vif = None;
        }
        if vif_type.is_beaconing() {
            // Everything else was torn down by stop_ap.
            self.dealloc_bcast_sta(st, vif_id);
        } else if vif_type == VifType::P2pDevice {
            st.p2p_device_vif = None;
            if let Err(e) = self.rm_bcast_sta(st, vif_id) {
                error!("failed to remove P2P broadcast station: {}", e);
            }
            if let Err(e) = self.binding_remove_vif(st, vif_id) {
                error!("failed to unbind P2P device: {}", e);
            }
            if let Ok(Some(phy)) = st.vif_mut(vif_id).map(|vif| vif.phy_ctxt.take()) {
                if let Err(e) = st.phy_ctxts.unref_ctxt(phy) {
                    error!("{}", e);
                }
            }
        }
        if vif_type != VifType::P2pDevice && st.vif_count > 0 {
            st.vif_count -= 1;
        }
        if let Err(e) = self.power_update_mac(st) {
            error!("failed to update power mode: {}", e);
        }
        if uploaded {
            if let Err(e) = self.mac_ctxt_remove(st, vif_id) {
                error!("failed to remove MAC {}: {}", vif_id.0, e);
            }
        }
        self.mac_ctxt_release(st, vif_id);
        info!("MAC {} released", vif_id.0);
    }

    fn bss_info_changed(&self, vif_id: VifId, conf: &BssConf, changed: BssChanged) {
        // Session protection reads the device clock.
        let result = self.with_ref(RefType::BssChanged, || {
            let mut st = self.state.lock();
            if changed.contains(BssChanged::IDLE)
                && !conf.idle
                && st.scan_status == ScanStatus::Sched
            {
                if let Err(e) = self.scan_offload_stop(&mut st, true) {
                    warn!("failed to stop scheduled scan: {}", e);
                }
            }
            let vif_type = st.vif(vif_id)?.vif_type;
            if vif_type.is_managed() {
                self.bss_info_changed_station(&mut st, vif_id, conf, changed)
            } else if vif_type.is_beaconing() {
                self.bss_info_changed_ap_ibss(&mut st, vif_id, conf, changed)
            } else {
                st.vif_mut(vif_id)?.bss_conf = conf.clone();
                Err(Error::violation(format!("BSS change on {:?} interface", vif_type)))
            }
        });
        if let Err(e) = result {
            error!("BSS change of MAC {} failed: {}", vif_id.0, e);
        }
    }

    fn start_ap(&self, vif_id: VifId) -> Result<(), Error> {
        self.with_ref(RefType::StartAp, || {
            let mut st = self.state.lock();
            self.start_ap_locked(&mut st, vif_id)
        })
    }

    fn stop_ap(&self, vif_id: VifId) {
        self.prepare_mac_removal(vif_id);

        let mut st = self.state.lock();
        let st = &mut *st;
        let (vif_type, active) = match st.vif(vif_id) {
            Ok(vif) => (vif.vif_type, vif.ap_ibss_active),
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };
        if !active {
            warn!("MAC {} is not beaconing", vif_id.0);
            return;
        }
        if st.csa_vif == Some(vif_id) {
            if let Err(e) = self.remove_time_event(vif_id, TeSlot::Session) {
                warn!("failed to remove channel switch time event: {}", e);
            }
            st.csa_vif = None;
        }
        if let Ok(vif) = st.vif_mut(vif_id) {
            vif.ap_ibss_active = false;
            vif.csa_active = false;
        }
        self.refs.release(RefType::ApIbss);
        if vif_type == VifType::P2pGo {
            self.update_p2p_device_mac(st);
        }
        if let Err(e) = self.update_quotas(st, None) {
            error!("failed to update quotas: {}", e);
        }
        if let Err(e) = self.send_rm_bcast_sta(st, vif_id) {
            error!("failed to remove broadcast station: {}", e);
        }
        if let Err(e) = self.binding_remove_vif(st, vif_id) {
            error!("failed to unbind MAC {}: {}", vif_id.0, e);
        }
        if let Err(e) = self.power_update_mac(st) {
            error!("failed to update power mode: {}", e);
        }
        if let Err(e) = self.mac_ctxt_remove(st, vif_id) {
            error!("failed to remove MAC {}: {}", vif_id.0, e);
        }
        info!("MAC {} stopped beaconing", vif_id.0);
    }

    fn conf_tx(&self, vif_id: VifId, ac: Ac, params: &TxQueueParams) -> Result<(), Error> {
        let mut st = self.state.lock();
        let vif_type = {
            let vif = st.vif_mut(vif_id)?;
            vif.queue_params[ac.index()] = *params;
            vif.vif_type
        };
        // Others pick the parameters up with the next QoS change.
        if vif_type == VifType::P2pDevice {
            self.mac_ctxt_changed(&mut st, vif_id, false)?;
        }
        Ok(())
    }

    fn sta_state(
        &self,
        vif_id: VifId,
        peer: &PeerSta,
        old: StaState,
        new: StaState,
    ) -> Result<(), Error> {
        debug!("station {:02x?} {:?} -> {:?}", peer.addr, old, new);
        let mut st = self.state.lock();
        self.sta_state_locked(&mut st, vif_id, peer, old, new)
    }

    fn sta_notify(&self, vif_id: VifId, addr: MacAddr, cmd: StaNotify) {
        let sta = match self.stations.find(vif_id, &addr) {
            Some(sta) => sta,
            None => {
                warn!("notification for unknown station {:02x?}", addr);
                return;
            }
        };
        match cmd {
            StaNotify::Sleep => self.sta_notify_sleep(&sta),
            StaNotify::Awake => {
                if let Err(e) = self.sta_notify_awake(&sta) {
                    error!("failed to wake station {}: {}", sta.sta_id.0, e);
                }
            }
        }
    }

    fn sta_pre_rcu_remove(&self, vif_id: VifId, addr: MacAddr) {
        let _st = self.state.lock();
        if let Some(sta) = self.stations.find(vif_id, &addr) {
            self.stations.hide(sta.sta_id);
        }
    }

    fn allow_buffered_frames(&self, vif_id: VifId, addr: MacAddr, tids: u8, num_frames: u16) {
        if let Some(sta) = self.stations.find(vif_id, &addr) {
            if let Err(e) = self.sta_modify_sleep_tx_count(&sta, num_frames, tids) {
                error!("failed to release frames to station {}: {}", sta.sta_id.0, e);
            }
        }
    }

    fn release_buffered_frames(&self, vif_id: VifId, addr: MacAddr, tids: u8, num_frames: u16) {
        self.allow_buffered_frames(vif_id, addr, tids, num_frames)
    }

    fn ampdu_action(
        &self,
        vif_id: VifId,
        addr: MacAddr,
        params: &mut AmpduParams,
    ) -> Result<(), Error> {
        if !self.config.ht_enabled {
            return Err(Error::NotSupported("802.11n"));
        }
        debug!("A-MPDU {:?} tid {} for {:02x?}", params.action, params.tid, addr);
        if params.action.is_tx() {
            // The sequence number is only valid once the device is out of low power.
            self.with_ref(RefType::TxAgg, || self.ampdu_action_locked(vif_id, &addr, params))
        } else {
            self.ampdu_action_locked(vif_id, &addr, params)
        }
    }

    fn hw_scan(&self, vif_id: VifId, req: &ScanRequest) -> Result<(), Error> {
        if req.channels.is_empty() || req.channels.len() > self.config.n_scan_channels {
            return Err(Error::InvalidArgument("scan channel count"));
        }
        // Scans cannot run concurrently.
        self.cancel_scan_wait_notif(ScanStatus::Sched)?;
        let mut st = self.state.lock();
        self.scan_request(&mut st, vif_id, req)
    }

    fn cancel_hw_scan(&self, _vif: VifId) {
        if let Err(e) = self.cancel_scan_wait_notif(ScanStatus::Os) {
            warn!("failed to cancel scan: {}", e);
        }
    }

    fn sched_scan_start(&self, vif_id: VifId, req: &SchedScanRequest) -> Result<(), Error> {
        if req.match_sets.is_empty() {
            return Err(Error::NotSupported("scheduled scan without match sets"));
        }
        self.cancel_scan_wait_notif(ScanStatus::Os)?;
        let mut st = self.state.lock();
        self.scan_offload_start(&mut st, vif_id, req)
    }

    fn sched_scan_stop(&self, _vif: VifId) -> Result<(), Error> {
        let result = {
            let mut st = self.state.lock();
            if st.scan_status == ScanStatus::Sched {
                self.scan_offload_stop(&mut st, false)
            } else {
                Ok(())
            }
        };
        self.process_async_handlers();
        result
    }

    fn remain_on_channel(
        &self,
        vif_id: VifId,
        chan: Channel,
        duration_ms: u32,
        roc_type: RocType,
    ) -> Result<(), Error> {
        debug!("remain on channel {:?} for {} ms on MAC {}", chan, duration_ms, vif_id.0);
        let mut st = self.state.lock();
        let vif_type = st.vif(vif_id)?.vif_type;
        if vif_type.is_managed() {
            if !self.config.hotspot_supported {
                error!("hotspot not supported");
                return Err(Error::InvalidArgument("remain on channel without hotspot support"));
            }
            return self.send_aux_roc_cmd(&st, vif_id, chan, duration_ms);
        }
        if vif_type != VifType::P2pDevice {
            error!("MAC {} ({:?}) cannot remain on channel", vif_id.0, vif_type);
            return Err(Error::InvalidArgument("remain on channel interface type"));
        }
        self.p2p_device_set_channel(&mut st, vif_id, chan)?;
        self.start_p2p_roc(vif_id, duration_ms, roc_type)
    }

    fn cancel_remain_on_channel(&self) {
        let _st = self.state.lock();
        self.stop_roc();
    }

    fn mgd_prepare_tx(&self, vif_id: VifId) {
        let result = self.with_ref(RefType::PrepareTx, || {
            let st = self.state.lock();
            let vif = st.vif(vif_id)?;
            if vif.associated {
                return Err(Error::violation(format!("MAC {} already associated", vif_id.0)));
            }
            let beacon_int = u32::from(vif.bss_conf.beacon_int);
            let duration = min(TE_SESSION_PROTECTION_MAX_TIME_MS, 200 + beacon_int);
            let min_duration = min(TE_SESSION_PROTECTION_MIN_TIME_MS, 100 + beacon_int);
            // Try hard to hear a beacon.
            self.protect_session(vif_id, duration, min_duration, 500, false)
        });
        if let Err(e) = result {
            warn!("failed to protect MAC {} before association: {}", vif_id.0, e);
        }
    }

    fn mgd_protect_tdls_discover(&self, vif_id: VifId) {
        let result = self.with_ref(RefType::ProtectTdls, || {
            let st = self.state.lock();
            let conf = &st.vif(vif_id)?.bss_conf;
            let duration = 2 * u32::from(conf.dtim_period) * u32::from(conf.beacon_int);
            // Stay on the channel to hear the TDLS setup response.
            self.protect_session(vif_id, duration, duration, 100, true)
        });
        if let Err(e) = result {
            warn!("failed to protect TDLS discovery on MAC {}: {}", vif_id.0, e);
        }
    }

    fn add_chanctx(&self, conf: &ChanctxConf) -> Result<PhyCtxtId, Error> {
        let mut st = self.state.lock();
        self.add_chanctx_locked(&mut st, conf, None)
    }

    fn remove_chanctx(&self, ctx: PhyCtxtId) {
        let mut st = self.state.lock();
        if let Err(e) = st.phy_ctxts.unref_ctxt(ctx) {
            error!("{}", e);
        }
    }

    fn change_chanctx(
        &self,
        ctx: PhyCtxtId,
        conf: &ChanctxConf,
        changed: ChanctxChanged,
    ) -> Result<(), Error> {
        let mut st = self.state.lock();
        let ref_count = st.phy_ctxts.get(ctx)?.ref_count;
        if ref_count > 1 && !(changed - ChanctxChanged::shareable()).is_empty() {
            return Err(Error::violation(format!(
                "cannot change PHY context {}: {} users, changes {:?}",
                ctx.0, ref_count, changed
            )));
        }
        self.phy_ctxt_changed(&mut st, ctx, conf)
    }

    fn assign_vif_chanctx(&self, vif_id: VifId, ctx: PhyCtxtId) -> Result<(), Error> {
        let mut st = self.state.lock();
        self.assign_vif_chanctx_locked(&mut st, vif_id, ctx, false)
    }

    fn unassign_vif_chanctx(&self, vif_id: VifId, _ctx: PhyCtxtId) {
        let mut st = self.state.lock();
        self.unassign_vif_chanctx_locked(&mut st, vif_id, false)
    }

    fn switch_vif_chanctx(
        &self,
        vif_id: VifId,
        old: PhyCtxtId,
        mode: ChanctxSwitchMode,
    ) -> Result<PhyCtxtId, Error> {
        info!("switching MAC {} off PHY context {}: {:?}", vif_id.0, old.0, mode);
        let mut st = self.state.lock();
        match mode {
            ChanctxSwitchMode::SwapContexts(conf) => {
                self.switch_swap_contexts(&mut st, vif_id, old, &conf)
            }
            ChanctxSwitchMode::Reassign(new) => self.switch_reassign(&mut st, vif_id, old, new),
        }
    }

    fn channel_switch_beacon(&self, vif_id: VifId, chandef: ChanDef) -> Result<(), Error> {
        let mut st = self.state.lock();
        if let Some(csa) = st.csa_vif {
            if st.vif(csa).map_or(false, |vif| vif.csa_active) {
                warn!("another channel switch is already in progress");
                return Err(Error::Busy("channel switch"));
            }
        }
        st.vif_mut(vif_id)?.csa_active = true;
        st.csa_vif = Some(vif_id);
        debug!("channel switch of MAC {} to {:?}", vif_id.0, chandef);
        Ok(())
    }

    fn flush(&self, vif: Option<VifId>, drop: bool) {
        let vif_id = match vif {
            Some(vif_id) => vif_id,
            None => return,
        };
        let mask = {
            let st = self.state.lock();
            let vif = match st.vif(vif_id) {
                Ok(vif) if vif.vif_type.is_managed() => vif,
                _ => return,
            };
            let sta = match vif.ap_sta_id.and_then(|id| self.stations.get(id)) {
                Some(sta) => sta,
                None => {
                    warn!("MAC {} has no AP station to flush", vif_id.0);
                    return;
                }
            };
            let mask = sta.inner.lock().tfd_queue_msk;
            if drop {
                if let Err(e) = self.trans.flush_tx_path(mask) {
                    error!("flush request failed: {}", e);
                }
                return;
            }
            mask
        };
        // Waiting can take a while; let other operations through meanwhile.
        if let Err(e) = self.trans.wait_tx_queue_empty(mask, self.config.cmd_timeout()) {
            warn!("queues {:#x} did not drain: {}", mask, e);
        }
    }

    fn prepare_multicast(&self, addrs: &[MacAddr]) -> McastFilter {
        McastFilter::from_addrs(addrs, self.config.mcast_pass_all)
    }

    fn configure_filter(&self, allmulti: bool, filter: Option<McastFilter>) {
        let mut filter = match filter {
            Some(filter) => filter,
            None => return,
        };
        if allmulti {
            filter.pass_all = true;
        }
        if filter.pass_all {
            filter.addrs.clear();
        }
        let mut st = self.state.lock();
        st.mcast_filter = filter;
        self.recalc_multicast(&st);
    }

    fn set_key(
        &self,
        cmd: KeyCommand,
        vif_id: VifId,
        sta: Option<MacAddr>,
        key: &mut KeyConf,
    ) -> Result<(), Error> {
        if self.config.sw_crypto {
            debug!("leaving encryption to software");
            return Err(Error::NotSupported("hardware crypto disabled"));
        }
        let mut st = self.state.lock();
        let vif_type = st.vif(vif_id)?.vif_type;
        match key.cipher {
            Cipher::Tkip => key.flags |= KeyFlags::GENERATE_MMIC | KeyFlags::PUT_IV_SPACE,
            Cipher::Ccmp => key.flags |= KeyFlags::PUT_IV_SPACE,
            Cipher::AesCmac => (),
            // Outside client mode WEP keys would have to follow every peer; software does it.
            Cipher::Wep40 | Cipher::Wep104 if vif_type.is_managed() => (),
            Cipher::Wep40 | Cipher::Wep104 | Cipher::Other(_) => {
                return Err(Error::NotSupported("cipher"))
            }
        }
        match cmd {
            KeyCommand::Set => {
                if vif_type.is_beaconing() && sta.is_none() {
                    // Group keys of AP and IBSS interfaces are only used for transmission.
                    key.hw_key_idx = None;
                    return Ok(());
                }
                if let Err(e) = self.set_sta_key(&mut st, vif_id, sta.as_ref(), key) {
                    // Transmission does not need the key in the device.
                    warn!("failed to install key: {}", e);
                    key.hw_key_idx = None;
                }
                Ok(())
            }
            KeyCommand::Disable => {
                if key.hw_key_idx.is_none() {
                    return Ok(());
                }
                self.remove_sta_key(&mut st, vif_id, sta.as_ref(), key)
            }
        }
    }

    fn set_tim(&self, vif_id: VifId, addr: MacAddr) -> Result<(), Error> {
        let mut st = self.state.lock();
        if self.stations.find(vif_id, &addr).is_none() {
            error!("station {:02x?} is not associated to MAC {}", addr, vif_id.0);
            return Err(Error::InvalidArgument("station"));
        }
        self.mac_ctxt_beacon_changed(&mut st, vif_id)
    }

    fn set_rts_threshold(&self, value: u32) -> Result<(), Error> {
        self.state.lock().rts_threshold = value;
        Ok(())
    }

    fn tx(&self, mut frame: TxFrame) {
        if self.status.is_radio_killed() {
            debug!("dropping frame: radio is killed");
            return;
        }
        if frame.hw_queue == OFFCHANNEL_QUEUE
            && !self.status.test(StatusFlags::ROC_RUNNING | StatusFlags::ROC_AUX_RUNNING)
        {
            debug!("dropping off-channel frame outside remain on channel");
            return;
        }
        match self.tx_target(&frame) {
            Some(TxTarget::Station(sta)) => {
                if self.defer_tx(&sta, &frame) {
                    return;
                }
                if let Some(queue) = frame.tid.and_then(|tid| self.sta_tx_agg_queue(&sta, tid)) {
                    frame.hw_queue = queue;
                }
                match self.trans.tx_frame(Some(sta.sta_id), &frame) {
                    Ok(()) => {
                        if let Some(tid) = frame.tid {
                            self.sta_tx_queued(&sta, tid);
                        }
                    }
                    Err(e) => warn!("dropping frame to station {}: {}", sta.sta_id.0, e),
                }
            }
            Some(TxTarget::NonStation(sta_id)) => {
                if let Err(e) = self.trans.tx_frame(sta_id, &frame) {
                    warn!("dropping frame: {}", e);
                }
            }
            None => (),
        }
    }
}
