// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        error::TransportError,
        fw_api::{HostCommand, Packet},
        types::{Band, MacAddr, StaId, TxFrame, VifId},
    },
    std::{sync::Weak, time::Duration},
};

#[cfg(test)]
pub use test_utils::*;

/// Consumer of every packet the firmware sends up, command responses included.
pub trait RxHandler: Send + Sync {
    fn rx_packet(&self, pkt: &Packet);
}

/// The command queue, register access and data path of the device.
pub trait Transport: Send + Sync {
    /// Registers the consumer of received packets. The core attaches itself once at creation.
    fn attach_rx_handler(&self, handler: Weak<dyn RxHandler>);
    /// Sends a command and waits for its response. Before returning, the response is handed to
    /// the attached `RxHandler` like any other received packet, so notification matchers run
    /// before the caller resumes.
    fn send_command(&self, cmd: &HostCommand) -> Result<Packet, TransportError>;
    /// Queues a command without waiting for its response.
    fn send_command_async(&self, cmd: &HostCommand) -> Result<(), TransportError>;
    fn read_device_register(&self, addr: u32) -> u32;
    fn write_device_register(&self, addr: u32, value: u32);
    /// Loads and boots the firmware image.
    fn start_firmware(&self) -> Result<(), TransportError>;
    fn stop_device(&self);
    fn wait_tx_queue_empty(&self, queue_mask: u32, timeout: Duration)
        -> Result<(), TransportError>;
    /// Drops every frame pending on the queues in `queue_mask`.
    fn flush_tx_path(&self, queue_mask: u32) -> Result<(), TransportError>;
    /// Keeps the device out of low-power states until the matching `unref_device`.
    fn ref_device(&self);
    fn unref_device(&self);
    fn tx_frame(&self, sta_id: Option<StaId>, frame: &TxFrame) -> Result<(), TransportError>;
}

/// Rate scaling lives outside the core; it only needs to know when a station's rates are valid.
pub trait RateControl: Send + Sync {
    fn init_rates(&self, sta_id: StaId, band: Band, is_initial: bool);
}

/// Events reported back to the upper wireless stack.
pub trait StackEvents: Send + Sync {
    fn ready_on_channel(&self);
    fn remain_on_channel_expired(&self);
    fn scan_completed(&self, aborted: bool);
    fn sched_scan_stopped(&self);
    fn start_tx_ba_ready(&self, addr: MacAddr, tid: u8);
    fn stop_tx_ba_ready(&self, addr: MacAddr, tid: u8);
    fn sta_set_buffered(&self, addr: MacAddr, tid: u8, buffered: bool);
    fn sta_block_awake(&self, addr: MacAddr, block: bool);
    fn tdls_teardown(&self, vif: VifId, addr: MacAddr);
    fn stop_queues(&self);
    fn wake_queues(&self);
    /// The core gave up on local recovery; the stack should restart the hardware.
    fn restart_hw(&self);
}

#[cfg(test)]
mod test_utils {
    use {
        super::*,
        crate::fw_api::{CommandId, FwAction, PacketPayload},
        parking_lot::Mutex,
        std::{
            collections::{HashMap, HashSet},
            sync::Arc,
        },
    };

    #[derive(Debug, Clone, PartialEq)]
    pub struct SentCommand {
        pub cmd: HostCommand,
        pub is_async: bool,
    }

    pub struct FakeTransportState {
        pub sent: Vec<SentCommand>,
        /// Commands answered with a non-zero firmware status.
        pub fw_status: HashMap<CommandId, u32>,
        /// Commands failing at the transport level.
        pub broken: HashSet<CommandId>,
        pub next_uid: u32,
        pub device_refs: i64,
        pub started: u32,
        pub stopped: u32,
        pub start_result: Result<(), TransportError>,
        pub flushed: Vec<u32>,
        pub waited_empty: Vec<u32>,
        pub frames: Vec<(Option<StaId>, TxFrame)>,
        pub registers: HashMap<u32, u32>,
        /// Deliver a completion notification after a scan abort.
        pub complete_scan_on_abort: bool,
    }

    pub struct FakeTransport {
        pub state: Mutex<FakeTransportState>,
        rx: Mutex<Option<Weak<dyn RxHandler>>>,
    }

    impl FakeTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(FakeTransportState {
                    sent: vec![],
                    fw_status: HashMap::new(),
                    broken: HashSet::new(),
                    next_uid: 0x100,
                    device_refs: 0,
                    started: 0,
                    stopped: 0,
                    start_result: Ok(()),
                    flushed: vec![],
                    waited_empty: vec![],
                    frames: vec![],
                    registers: HashMap::new(),
                    complete_scan_on_abort: true,
                }),
                rx: Mutex::new(None),
            })
        }

        pub fn sent_ids(&self) -> Vec<CommandId> {
            self.state.lock().sent.iter().map(|s| s.cmd.id()).collect()
        }

        pub fn drain_commands(&self) -> Vec<HostCommand> {
            self.state.lock().sent.drain(..).map(|s| s.cmd).collect()
        }

        pub fn clear(&self) {
            self.state.lock().sent.clear();
        }

        pub fn count(&self, id: CommandId) -> usize {
            self.state.lock().sent.iter().filter(|s| s.cmd.id() == id).count()
        }

        pub fn reject(&self, id: CommandId, status: u32) {
            self.state.lock().fw_status.insert(id, status);
        }

        pub fn accept(&self, id: CommandId) {
            let mut state = self.state.lock();
            state.fw_status.remove(&id);
            state.broken.remove(&id);
        }

        pub fn break_command(&self, id: CommandId) {
            self.state.lock().broken.insert(id);
        }

        pub fn device_refs(&self) -> i64 {
            self.state.lock().device_refs
        }

        /// Unique id handed out with the most recent time event response.
        pub fn last_uid(&self) -> u32 {
            self.state.lock().next_uid - 1
        }

        pub fn deliver(&self, pkt: &Packet) {
            let handler = self.rx.lock().as_ref().and_then(|weak| weak.upgrade());
            if let Some(handler) = handler {
                handler.rx_packet(pkt);
            }
        }

        fn response(&self, cmd: &HostCommand) -> Packet {
            let mut state = self.state.lock();
            let status = state.fw_status.get(&cmd.id()).cloned().unwrap_or(0);
            let payload = match cmd {
                HostCommand::TimeEvent(te) if te.action == FwAction::Add => {
                    let uid = state.next_uid;
                    state.next_uid += 1;
                    PacketPayload::TimeEventResponse { status, uid }
                }
                HostCommand::HotSpot(hs) if hs.action == FwAction::Add => {
                    let uid = state.next_uid;
                    state.next_uid += 1;
                    PacketPayload::TimeEventResponse { status, uid }
                }
                _ => PacketPayload::Status(status),
            };
            Packet::new(cmd.id(), payload)
        }
    }

    impl Transport for FakeTransport {
        fn attach_rx_handler(&self, handler: Weak<dyn RxHandler>) {
            *self.rx.lock() = Some(handler);
        }

        fn send_command(&self, cmd: &HostCommand) -> Result<Packet, TransportError> {
            let complete_scan_on_abort = {
                let mut state = self.state.lock();
                state.sent.push(SentCommand { cmd: cmd.clone(), is_async: false });
                if state.broken.contains(&cmd.id()) {
                    return Err(TransportError::Io(format!("{:?} broken", cmd.id())));
                }
                state.complete_scan_on_abort
            };
            let resp = self.response(cmd);
            self.deliver(&resp);
            if complete_scan_on_abort && resp.status() == 0 {
                match cmd {
                    HostCommand::ScanAbort => self.deliver(&Packet::scan_complete(true)),
                    HostCommand::ScanOffloadAbort => self.deliver(&Packet::sched_scan_complete()),
                    _ => (),
                }
            }
            Ok(resp)
        }

        fn send_command_async(&self, cmd: &HostCommand) -> Result<(), TransportError> {
            let mut state = self.state.lock();
            state.sent.push(SentCommand { cmd: cmd.clone(), is_async: true });
            if state.broken.contains(&cmd.id()) {
                return Err(TransportError::Io(format!("{:?} broken", cmd.id())));
            }
            Ok(())
        }

        fn read_device_register(&self, addr: u32) -> u32 {
            self.state.lock().registers.get(&addr).cloned().unwrap_or(0)
        }

        fn write_device_register(&self, addr: u32, value: u32) {
            self.state.lock().registers.insert(addr, value);
        }

        fn start_firmware(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock();
            state.started += 1;
            state.start_result.clone()
        }

        fn stop_device(&self) {
            self.state.lock().stopped += 1;
        }

        fn wait_tx_queue_empty(
            &self,
            queue_mask: u32,
            _timeout: Duration,
        ) -> Result<(), TransportError> {
            self.state.lock().waited_empty.push(queue_mask);
            Ok(())
        }

        fn flush_tx_path(&self, queue_mask: u32) -> Result<(), TransportError> {
            self.state.lock().flushed.push(queue_mask);
            Ok(())
        }

        fn ref_device(&self) {
            self.state.lock().device_refs += 1;
        }

        fn unref_device(&self) {
            self.state.lock().device_refs -= 1;
        }

        fn tx_frame(&self, sta_id: Option<StaId>, frame: &TxFrame) -> Result<(), TransportError> {
            self.state.lock().frames.push((sta_id, frame.clone()));
            Ok(())
        }
    }

    pub struct FakeRateControl {
        pub inits: Mutex<Vec<(StaId, Band, bool)>>,
    }

    impl FakeRateControl {
        pub fn new() -> Arc<Self> {
            Arc::new(Self { inits: Mutex::new(vec![]) })
        }
    }

    impl RateControl for FakeRateControl {
        fn init_rates(&self, sta_id: StaId, band: Band, is_initial: bool) {
            self.inits.lock().push((sta_id, band, is_initial));
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum StackEvent {
        ReadyOnChannel,
        RocExpired,
        ScanCompleted { aborted: bool },
        SchedScanStopped,
        StartTxBaReady { addr: MacAddr, tid: u8 },
        StopTxBaReady { addr: MacAddr, tid: u8 },
        SetBuffered { addr: MacAddr, tid: u8, buffered: bool },
        BlockAwake { addr: MacAddr, block: bool },
        TdlsTeardown { vif: VifId, addr: MacAddr },
        StopQueues,
        WakeQueues,
        RestartHw,
    }

    pub struct FakeStack {
        events: Mutex<Vec<StackEvent>>,
    }

    impl FakeStack {
        pub fn new() -> Arc<Self> {
            Arc::new(Self { events: Mutex::new(vec![]) })
        }

        pub fn drain_events(&self) -> Vec<StackEvent> {
            self.events.lock().drain(..).collect()
        }

        fn push(&self, event: StackEvent) {
            self.events.lock().push(event);
        }
    }

    impl StackEvents for FakeStack {
        fn ready_on_channel(&self) {
            self.push(StackEvent::ReadyOnChannel);
        }
        fn remain_on_channel_expired(&self) {
            self.push(StackEvent::RocExpired);
        }
        fn scan_completed(&self, aborted: bool) {
            self.push(StackEvent::ScanCompleted { aborted });
        }
        fn sched_scan_stopped(&self) {
            self.push(StackEvent::SchedScanStopped);
        }
        fn start_tx_ba_ready(&self, addr: MacAddr, tid: u8) {
            self.push(StackEvent::StartTxBaReady { addr, tid });
        }
        fn stop_tx_ba_ready(&self, addr: MacAddr, tid: u8) {
            self.push(StackEvent::StopTxBaReady { addr, tid });
        }
        fn sta_set_buffered(&self, addr: MacAddr, tid: u8, buffered: bool) {
            self.push(StackEvent::SetBuffered { addr, tid, buffered });
        }
        fn sta_block_awake(&self, addr: MacAddr, block: bool) {
            self.push(StackEvent::BlockAwake { addr, block });
        }
        fn tdls_teardown(&self, vif: VifId, addr: MacAddr) {
            self.push(StackEvent::TdlsTeardown { vif, addr });
        }
        fn stop_queues(&self) {
            self.push(StackEvent::StopQueues);
        }
        fn wake_queues(&self) {
            self.push(StackEvent::WakeQueues);
        }
        fn restart_hw(&self) {
            self.push(StackEvent::RestartHw);
        }
    }
}
