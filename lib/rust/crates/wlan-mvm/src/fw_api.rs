// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host commands and received packets exchanged with the firmware. Wire encoding belongs to the
//! transport; these are the typed payloads the core produces and consumes.

use crate::types::{
    Band, ChanDef, Channel, Cipher, MacAddr, PhyCtxtId, StaId, TxQueueParams, VifId, VifType,
};

/// Register holding the device's free-running system time, in microseconds.
pub const DEVICE_SYSTEM_TIME_REG: u32 = 0xa0_6c00;

/// Full quota share, split between active bindings.
pub const QUOTA_100: u32 = 128;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CommandId {
    PhyContext,
    Binding,
    MacContext,
    AddSta,
    RemoveSta,
    AddKey,
    RemoveKey,
    ScdQueueConfig,
    TimeEvent,
    HotSpot,
    Quota,
    MacPmPowerTable,
    BeaconFilter,
    BeaconTemplate,
    McastFilter,
    Echo,
    ReduceTxPower,
    ScanRequest,
    ScanAbort,
    LmacScan,
    SchedScanConfig,
    SchedScanProfiles,
    SchedScanStart,
    ScanOffloadAbort,
    TxPathFlush,
    // Notifications
    TimeEventNotification,
    ScanCompleteNotification,
    ScanOffloadCompleteNotification,
    TxResponse,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FwAction {
    Add,
    Modify,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyContextCmd {
    pub id: PhyCtxtId,
    pub action: FwAction,
    pub def: ChanDef,
    pub rx_chains_static: u8,
    pub rx_chains_dynamic: u8,
    pub apply_time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingCmd {
    /// Bindings share the id of the PHY context they target.
    pub id: PhyCtxtId,
    pub action: FwAction,
    pub phy: PhyCtxtId,
    pub macs: Vec<VifId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacContextCmd {
    pub id: VifId,
    pub action: FwAction,
    pub vif_type: VifType,
    pub addr: MacAddr,
    pub bssid: MacAddr,
    pub assoc: bool,
    pub beacon_int: u16,
    pub dtim_period: u8,
    pub qos: bool,
    pub ac_params: [TxQueueParams; 4],
    /// Set for the P2P device while a GO is running, so it protects the GO's NoA.
    pub go_active: bool,
    /// Stop transmitting until the next beacon, used around channel switches.
    pub force_assoc_off: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddStaCmd {
    pub sta_id: StaId,
    pub mac_id: VifId,
    pub addr: MacAddr,
    /// Modify an existing entry rather than create one.
    pub modify: bool,
    pub tfd_queue_msk: u32,
    pub awake: bool,
    pub add_immediate_ba_tid: Option<(u8, u16)>,
    pub remove_immediate_ba_tid: Option<u8>,
    pub sleep_tx_count: Option<(u16, u16)>,
    pub disable_tx: bool,
}

impl AddStaCmd {
    pub fn new(sta_id: StaId, mac_id: VifId, addr: MacAddr, tfd_queue_msk: u32) -> Self {
        Self {
            sta_id,
            mac_id,
            addr,
            modify: false,
            tfd_queue_msk,
            awake: true,
            add_immediate_ba_tid: None,
            remove_immediate_ba_tid: None,
            sleep_tx_count: None,
            disable_tx: false,
        }
    }

    pub fn modify(sta_id: StaId, mac_id: VifId, addr: MacAddr, tfd_queue_msk: u32) -> Self {
        Self { modify: true, ..Self::new(sta_id, mac_id, addr, tfd_queue_msk) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddKeyCmd {
    pub sta_id: StaId,
    pub key_offset: u8,
    pub keyidx: u8,
    pub cipher: Cipher,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScdQueueCfgCmd {
    pub queue: u8,
    pub sta_id: StaId,
    pub tid: u8,
    pub enable: bool,
    pub frame_limit: u8,
    pub ssn: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimeEventType {
    /// Association protection for a managed interface.
    SessionProtect,
    P2pDeviceDiscoverable,
    P2pDeviceActionScan,
    ChannelSwitchPeriod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeEventCmd {
    pub action: FwAction,
    pub mac_id: VifId,
    pub event_type: Option<TimeEventType>,
    /// Unique id of the event to remove; unused for `Add`.
    pub uid: Option<u32>,
    pub apply_time: u32,
    pub max_delay: u32,
    pub duration: u32,
    pub notify_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotSpotCmd {
    pub action: FwAction,
    pub aux_sta: Option<StaId>,
    pub node_addr: MacAddr,
    pub band: Band,
    pub channel: u8,
    pub apply_time: u32,
    pub max_delay: u32,
    pub duration: u32,
    pub uid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingQuota {
    pub id: PhyCtxtId,
    pub quota: u32,
    pub max_duration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCmd {
    pub quotas: Vec<BindingQuota>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacPower {
    pub mac_id: VifId,
    pub ps_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconFilterCmd {
    pub mac_id: VifId,
    pub enable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McastFilterCmd {
    pub port_id: u8,
    pub bssid: MacAddr,
    pub pass_all: bool,
    pub addrs: Vec<MacAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCmd {
    pub mac_id: VifId,
    pub channels: Vec<Channel>,
    pub ssids: Vec<Vec<u8>>,
    pub ies: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedScanCmd {
    pub mac_id: VifId,
    pub channels: Vec<Channel>,
    pub interval_ms: u32,
    pub ies: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    PhyContext(PhyContextCmd),
    Binding(BindingCmd),
    MacContext(MacContextCmd),
    AddSta(AddStaCmd),
    RemoveSta { sta_id: StaId },
    AddKey(AddKeyCmd),
    RemoveKey { sta_id: StaId, key_offset: u8, keyidx: u8 },
    ScdQueueConfig(ScdQueueCfgCmd),
    TimeEvent(TimeEventCmd),
    HotSpot(HotSpotCmd),
    Quota(QuotaCmd),
    MacPmPowerTable(Vec<MacPower>),
    BeaconFilter(BeaconFilterCmd),
    BeaconTemplate { mac_id: VifId },
    McastFilter(McastFilterCmd),
    Echo,
    ReduceTxPower { mac_id: VifId, limit_dbm: i8 },
    ScanRequest(ScanCmd),
    ScanAbort,
    LmacScan(ScanCmd),
    SchedScanConfig(SchedScanCmd),
    SchedScanProfiles { match_sets: Vec<Vec<u8>> },
    SchedScanStart(SchedScanCmd),
    ScanOffloadAbort,
}

impl HostCommand {
    pub fn id(&self) -> CommandId {
        match self {
            HostCommand::PhyContext(_) => CommandId::PhyContext,
            HostCommand::Binding(_) => CommandId::Binding,
            HostCommand::MacContext(_) => CommandId::MacContext,
            HostCommand::AddSta(_) => CommandId::AddSta,
            HostCommand::RemoveSta { .. } => CommandId::RemoveSta,
            HostCommand::AddKey(_) => CommandId::AddKey,
            HostCommand::RemoveKey { .. } => CommandId::RemoveKey,
            HostCommand::ScdQueueConfig(_) => CommandId::ScdQueueConfig,
            HostCommand::TimeEvent(_) => CommandId::TimeEvent,
            HostCommand::HotSpot(_) => CommandId::HotSpot,
            HostCommand::Quota(_) => CommandId::Quota,
            HostCommand::MacPmPowerTable(_) => CommandId::MacPmPowerTable,
            HostCommand::BeaconFilter(_) => CommandId::BeaconFilter,
            HostCommand::BeaconTemplate { .. } => CommandId::BeaconTemplate,
            HostCommand::McastFilter(_) => CommandId::McastFilter,
            HostCommand::Echo => CommandId::Echo,
            HostCommand::ReduceTxPower { .. } => CommandId::ReduceTxPower,
            HostCommand::ScanRequest(_) => CommandId::ScanRequest,
            HostCommand::ScanAbort => CommandId::ScanAbort,
            HostCommand::LmacScan(_) => CommandId::LmacScan,
            HostCommand::SchedScanConfig(_) => CommandId::SchedScanConfig,
            HostCommand::SchedScanProfiles { .. } => CommandId::SchedScanProfiles,
            HostCommand::SchedScanStart(_) => CommandId::SchedScanStart,
            HostCommand::ScanOffloadAbort => CommandId::ScanOffloadAbort,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimeEventNotifAction {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketPayload {
    /// Generic command response; zero is success.
    Status(u32),
    /// Response to `TimeEvent` and `HotSpot` add commands.
    TimeEventResponse { status: u32, uid: u32 },
    TimeEventNotif { uid: u32, action: TimeEventNotifAction, success: bool },
    ScanComplete { aborted: bool },
    TxResponse { sta_id: StaId, tid: u8, frames: u16 },
    Empty,
}

/// A packet received from the firmware: either a command response or a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub cmd: CommandId,
    pub payload: PacketPayload,
}

impl Packet {
    pub fn new(cmd: CommandId, payload: PacketPayload) -> Self {
        Self { cmd, payload }
    }

    pub fn status(&self) -> u32 {
        match self.payload {
            PacketPayload::Status(status) | PacketPayload::TimeEventResponse { status, .. } => {
                status
            }
            _ => 0,
        }
    }

    pub fn time_event_notif(uid: u32, action: TimeEventNotifAction) -> Self {
        Self::new(
            CommandId::TimeEventNotification,
            PacketPayload::TimeEventNotif { uid, action, success: true },
        )
    }

    pub fn scan_complete(aborted: bool) -> Self {
        Self::new(CommandId::ScanCompleteNotification, PacketPayload::ScanComplete { aborted })
    }

    pub fn sched_scan_complete() -> Self {
        Self::new(
            CommandId::ScanOffloadCompleteNotification,
            PacketPayload::ScanComplete { aborted: false },
        )
    }

    pub fn tx_response(sta_id: StaId, tid: u8, frames: u16) -> Self {
        Self::new(CommandId::TxResponse, PacketPayload::TxResponse { sta_id, tid, frames })
    }
}
