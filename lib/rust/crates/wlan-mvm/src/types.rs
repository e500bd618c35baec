// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use bitflags::bitflags;

pub type MacAddr = [u8; 6];

pub const BROADCAST_ADDR: MacAddr = [0xff; 6];
pub const ZERO_ADDR: MacAddr = [0; 6];

/// Firmware MAC-context slots available to the driver.
pub const MAX_MACS: usize = 4;
pub const NUM_PHY_CTX: usize = 3;
pub const STATION_COUNT: usize = 16;
pub const TDLS_STA_COUNT: usize = 4;
pub const TID_COUNT: usize = 8;
pub const MAX_MACS_IN_BINDING: usize = 3;

pub const MAX_QUEUES: u8 = 32;
pub const OFFCHANNEL_QUEUE: u8 = 8;
pub const CMD_QUEUE: u8 = 9;

/// Firmware crashes on beacon intervals below this value.
pub const MIN_BEACON_INTERVAL: u16 = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VifId(pub u8);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StaId(pub u8);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhyCtxtId(pub u8);

impl VifId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl StaId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl PhyCtxtId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Band {
    TwoGhz,
    FiveGhz,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    pub band: Band,
    pub number: u8,
}

impl Channel {
    pub const fn new_2ghz(number: u8) -> Self {
        Self { band: Band::TwoGhz, number }
    }

    pub const fn new_5ghz(number: u8) -> Self {
        Self { band: Band::FiveGhz, number }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ChanWidth {
    NoHt20,
    Ht20,
    Ht40,
    Vht80,
    Vht160,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChanDef {
    pub chan: Channel,
    pub width: ChanWidth,
}

impl ChanDef {
    pub const fn no_ht(chan: Channel) -> Self {
        Self { chan, width: ChanWidth::NoHt20 }
    }
}

/// Channel configuration the firmware is loaded with before any interface exists.
pub const DEFAULT_CHAN_DEF: ChanDef = ChanDef::no_ht(Channel::new_2ghz(1));

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VifType {
    Station,
    Ap,
    P2pClient,
    P2pGo,
    P2pDevice,
    Adhoc,
    Monitor,
}

impl VifType {
    pub fn is_p2p(self) -> bool {
        match self {
            VifType::P2pClient | VifType::P2pGo | VifType::P2pDevice => true,
            _ => false,
        }
    }

    /// Station and P2P client interfaces share the managed-mode flows.
    pub fn is_managed(self) -> bool {
        self == VifType::Station || self == VifType::P2pClient
    }

    /// AP, P2P GO and IBSS interfaces defer binding until the beacon template exists.
    pub fn is_beaconing(self) -> bool {
        match self {
            VifType::Ap | VifType::P2pGo | VifType::Adhoc => true,
            _ => false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Ac {
    Vo = 0,
    Vi = 1,
    Be = 2,
    Bk = 3,
}

impl Ac {
    pub const ALL: [Ac; 4] = [Ac::Vo, Ac::Vi, Ac::Be, Ac::Bk];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TxQueueParams {
    pub txop: u16,
    pub cw_min: u16,
    pub cw_max: u16,
    pub aifs: u8,
    pub uapsd: bool,
}

/// Parameters of a new virtual interface as handed down by the upper stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VifParams {
    pub vif_type: VifType,
    pub addr: MacAddr,
}

bitflags! {
    pub struct BssChanged: u32 {
        const ASSOC = 1 << 0;
        const ERP_CTS_PROT = 1 << 1;
        const BEACON_INT = 1 << 5;
        const BSSID = 1 << 7;
        const BEACON = 1 << 8;
        const BEACON_ENABLED = 1 << 9;
        const CQM = 1 << 10;
        const HT = 1 << 12;
        const ARP_FILTER = 1 << 14;
        const QOS = 1 << 15;
        const IDLE = 1 << 16;
        const PS = 1 << 18;
        const TXPOWER = 1 << 19;
        const P2P_PS = 1 << 20;
        const BEACON_INFO = 1 << 21;
        const BANDWIDTH = 1 << 22;
    }
}

/// BSS configuration of an interface, as maintained by the upper stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BssConf {
    pub assoc: bool,
    pub bssid: MacAddr,
    /// Beacon interval in TU.
    pub beacon_int: u16,
    pub dtim_period: u8,
    pub idle: bool,
    pub ps: bool,
    pub qos: bool,
    /// Transmit power limit in dBm.
    pub txpower: i8,
}

impl Default for BssConf {
    fn default() -> Self {
        Self {
            assoc: false,
            bssid: ZERO_ADDR,
            beacon_int: 100,
            dtim_period: 1,
            idle: true,
            ps: false,
            qos: false,
            txpower: 20,
        }
    }
}

bitflags! {
    pub struct ChanctxChanged: u32 {
        const WIDTH = 1 << 0;
        const RX_CHAINS = 1 << 1;
        const RADAR = 1 << 2;
        const CHANNEL = 1 << 3;
        const MIN_WIDTH = 1 << 4;
    }
}

impl ChanctxChanged {
    /// Changes a PHY context tolerates while shared by several interfaces.
    pub fn shareable() -> Self {
        Self::WIDTH | Self::RX_CHAINS | Self::RADAR | Self::MIN_WIDTH
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChanctxConf {
    pub def: ChanDef,
    pub rx_chains_static: u8,
    pub rx_chains_dynamic: u8,
}

impl ChanctxConf {
    pub fn new(def: ChanDef) -> Self {
        Self { def, rx_chains_static: 1, rx_chains_dynamic: 1 }
    }
}

/// How an interface moves to a new channel context.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChanctxSwitchMode {
    /// Both contexts exist and outlive the switch.
    Reassign(PhyCtxtId),
    /// The old context goes away and the new one, with this configuration, is created.
    SwapContexts(ChanctxConf),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum StaState {
    NotExist,
    None,
    Auth,
    Assoc,
    Authorized,
}

/// Peer station as described by the upper stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSta {
    pub addr: MacAddr,
    pub tdls: bool,
}

impl PeerSta {
    pub fn new(addr: MacAddr) -> Self {
        Self { addr, tdls: false }
    }

    pub fn tdls(addr: MacAddr) -> Self {
        Self { addr, tdls: true }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StaNotify {
    Sleep,
    Awake,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AmpduAction {
    RxStart,
    RxStop,
    TxStart,
    TxStopCont,
    TxStopFlush,
    TxStopFlushCont,
    TxOperational,
}

impl AmpduAction {
    pub fn is_tx(self) -> bool {
        match self {
            AmpduAction::RxStart | AmpduAction::RxStop => false,
            _ => true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AmpduParams {
    pub action: AmpduAction,
    pub tid: u8,
    /// Starting sequence number. Written back by `TxStart`.
    pub ssn: u16,
    pub buf_size: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RocType {
    Normal,
    MgmtTx,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanRequest {
    pub channels: Vec<Channel>,
    pub ssids: Vec<Vec<u8>>,
    pub ies: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchedScanRequest {
    pub channels: Vec<Channel>,
    /// SSIDs to report; an empty list would mean "match all".
    pub match_sets: Vec<Vec<u8>>,
    pub interval_ms: u32,
    pub ies: Vec<u8>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cipher {
    Wep40,
    Wep104,
    Tkip,
    Ccmp,
    AesCmac,
    Other(u32),
}

bitflags! {
    pub struct KeyFlags: u32 {
        const GENERATE_IV = 1 << 1;
        const GENERATE_MMIC = 1 << 2;
        const PUT_IV_SPACE = 1 << 7;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    Set,
    Disable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConf {
    pub cipher: Cipher,
    pub keyidx: u8,
    /// Hardware key offset; `None` when the key only lives in software.
    pub hw_key_idx: Option<u8>,
    pub flags: KeyFlags,
    pub key: Vec<u8>,
}

impl KeyConf {
    pub fn new(cipher: Cipher, keyidx: u8, key: Vec<u8>) -> Self {
        Self { cipher, keyidx, hw_key_idx: None, flags: KeyFlags::empty(), key }
    }
}

/// A frame handed to the driver for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    pub vif: VifId,
    pub sta: Option<MacAddr>,
    pub tid: Option<u8>,
    pub hw_queue: u8,
    /// Non-bufferable management frame; sent as broadcast while the peer sleeps.
    pub no_ps_buffer_mgmt: bool,
    pub data: Vec<u8>,
}
