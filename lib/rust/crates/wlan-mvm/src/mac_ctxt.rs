// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        error::Error,
        fw_api::{FwAction, HostCommand, MacContextCmd},
        mvm::{Mvm, MvmState},
        types::{
            Ac, BssConf, MacAddr, PhyCtxtId, StaId, TxQueueParams, VifId, VifParams, VifType,
            CMD_QUEUE, MAX_MACS, MAX_QUEUES, OFFCHANNEL_QUEUE, ZERO_ADDR,
        },
    },
    log::{debug, info},
};

/// Driver-side record of a virtual interface. Its id is also the firmware MAC context id.
#[derive(Debug, Clone)]
pub struct Vif {
    pub id: VifId,
    pub vif_type: VifType,
    pub addr: MacAddr,
    pub phy_ctxt: Option<PhyCtxtId>,
    /// The MAC context exists in firmware.
    pub uploaded: bool,
    pub associated: bool,
    pub bssid: MacAddr,
    pub ap_sta_id: Option<StaId>,
    /// Broadcast station of AP, IBSS and P2P device interfaces.
    pub bcast_sta: Option<StaId>,
    pub ap_ibss_active: bool,
    pub monitor_active: bool,
    pub ps_disabled: bool,
    pub bf_enabled: bool,
    pub csa_active: bool,
    pub bss_conf: BssConf,
    pub queue_params: [TxQueueParams; 4],
    pub hw_queues: [u8; 4],
    /// Content-after-beacon queue of AP and IBSS interfaces.
    pub cab_queue: Option<u8>,
}

impl Vif {
    fn new(id: VifId, params: &VifParams, hw_queues: [u8; 4], cab_queue: Option<u8>) -> Self {
        Self {
            id,
            vif_type: params.vif_type,
            addr: params.addr,
            phy_ctxt: None,
            uploaded: false,
            associated: false,
            bssid: ZERO_ADDR,
            ap_sta_id: None,
            bcast_sta: None,
            ap_ibss_active: false,
            monitor_active: false,
            ps_disabled: false,
            bf_enabled: false,
            csa_active: false,
            bss_conf: BssConf::default(),
            queue_params: [TxQueueParams::default(); 4],
            hw_queues,
            cab_queue,
        }
    }

    pub fn queues_mask(&self) -> u32 {
        let mut mask = self.hw_queues.iter().fold(0, |mask, &q| mask | (1 << q));
        if let Some(cab) = self.cab_queue {
            mask |= 1 << cab;
        }
        mask
    }

    pub fn ac_queue(&self, ac: Ac) -> u8 {
        self.hw_queues[ac.index()]
    }
}

/// Hardware transmit queues shared by interfaces and aggregation sessions.
pub struct QueuePool {
    free: u32,
}

impl QueuePool {
    pub fn new() -> Self {
        let all = u32::max_value() >> (32 - u32::from(MAX_QUEUES));
        Self { free: all & !(1 << OFFCHANNEL_QUEUE) & !(1 << CMD_QUEUE) }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn alloc(&mut self) -> Result<u8, Error> {
        if self.free == 0 {
            return Err(Error::ResourceExhausted("transmit queue"));
        }
        let queue = self.free.trailing_zeros() as u8;
        self.free &= !(1 << queue);
        Ok(queue)
    }

    pub fn free(&mut self, queue: u8) {
        if queue == OFFCHANNEL_QUEUE || queue == CMD_QUEUE || queue >= MAX_QUEUES {
            return;
        }
        self.free |= 1 << queue;
    }

    pub fn available(&self) -> u32 {
        self.free.count_ones()
    }
}

impl Mvm {
    /// Allocates a MAC id and transmit queues for a new interface and records it.
    pub(crate) fn mac_ctxt_init(
        &self,
        st: &mut MvmState,
        params: &VifParams,
    ) -> Result<VifId, Error> {
        let slot = st
            .vifs
            .iter()
            .position(|vif| vif.is_none())
            .ok_or(Error::ResourceExhausted("MAC context"))?;
        let id = VifId(slot as u8);

        let mut queues = self.queues.lock();
        let hw_queues = if params.vif_type == VifType::P2pDevice {
            [OFFCHANNEL_QUEUE; 4]
        } else {
            let mut hw_queues = [0u8; 4];
            for i in 0..hw_queues.len() {
                match queues.alloc() {
                    Ok(q) => hw_queues[i] = q,
                    Err(e) => {
                        hw_queues[..i].iter().for_each(|&q| queues.free(q));
                        return Err(e);
                    }
                }
            }
            hw_queues
        };
        let cab_queue = match params.vif_type {
            VifType::Ap | VifType::Adhoc | VifType::P2pGo => match queues.alloc() {
                Ok(q) => Some(q),
                Err(e) => {
                    hw_queues.iter().for_each(|&q| queues.free(q));
                    return Err(e);
                }
            },
            _ => None,
        };
        drop(queues);

        debug!("MAC {} ({:?}) queues {:?} cab {:?}", id.0, params.vif_type, hw_queues, cab_queue);
        st.vifs[slot] = Some(Vif::new(id, params, hw_queues, cab_queue));
        Ok(id)
    }

    /// Forgets the interface and returns its queues to the pool.
    pub(crate) fn mac_ctxt_release(&self, st: &mut MvmState, vif_id: VifId) {
        if let Some(vif) = st.vifs.get_mut(vif_id.index()).and_then(|v| v.take()) {
            let mut queues = self.queues.lock();
            vif.hw_queues.iter().for_each(|&q| queues.free(q));
            if let Some(cab) = vif.cab_queue {
                queues.free(cab);
            }
        }
    }

    fn mac_ctxt_cmd(
        &self,
        st: &MvmState,
        vif: &Vif,
        action: FwAction,
        force_assoc_off: bool,
    ) -> HostCommand {
        let go_active = vif.vif_type == VifType::P2pDevice
            && st.vifs().any(|v| v.vif_type == VifType::P2pGo && v.ap_ibss_active);
        HostCommand::MacContext(MacContextCmd {
            id: vif.id,
            action,
            vif_type: vif.vif_type,
            addr: vif.addr,
            bssid: vif.bssid,
            assoc: vif.associated && !force_assoc_off,
            beacon_int: vif.bss_conf.beacon_int,
            dtim_period: vif.bss_conf.dtim_period,
            qos: vif.bss_conf.qos,
            ac_params: vif.queue_params,
            go_active,
            force_assoc_off,
        })
    }

    pub(crate) fn mac_ctxt_add(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let vif = st.vif(vif_id)?;
        if vif.uploaded {
            return Err(Error::violation(format!("MAC {} already uploaded", vif_id.0)));
        }
        let cmd = self.mac_ctxt_cmd(st, vif, FwAction::Add, false);
        self.send_cmd(cmd)?;
        st.vif_mut(vif_id)?.uploaded = true;
        Ok(())
    }

    pub(crate) fn mac_ctxt_changed(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        force_assoc_off: bool,
    ) -> Result<(), Error> {
        let vif = st.vif(vif_id)?;
        if !vif.uploaded {
            return Err(Error::violation(format!("changing MAC {} before upload", vif_id.0)));
        }
        let cmd = self.mac_ctxt_cmd(st, vif, FwAction::Modify, force_assoc_off);
        self.send_cmd(cmd)?;
        Ok(())
    }

    pub(crate) fn mac_ctxt_remove(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let vif = st.vif(vif_id)?;
        if !vif.uploaded {
            return Err(Error::violation(format!("removing MAC {} before upload", vif_id.0)));
        }
        let cmd = self.mac_ctxt_cmd(st, vif, FwAction::Remove, false);
        self.send_cmd(cmd)?;
        st.vif_mut(vif_id)?.uploaded = false;
        info!("MAC {} removed", vif_id.0);
        Ok(())
    }

    /// Uploads a new beacon template for an AP or IBSS interface.
    pub(crate) fn mac_ctxt_beacon_changed(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
    ) -> Result<(), Error> {
        let vif = st.vif(vif_id)?;
        if !vif.vif_type.is_beaconing() {
            return Err(Error::violation(format!("beacon for non-beaconing MAC {}", vif_id.0)));
        }
        self.send_cmd(HostCommand::BeaconTemplate { mac_id: vif_id })?;
        Ok(())
    }
}

/// All interface slots, used or not.
pub fn vif_slots() -> Vec<Option<Vif>> {
    vec![None; MAX_MACS]
}
