// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        error::Error,
        fw_api::{CommandId, HostCommand, Packet, PacketPayload, ScanCmd, SchedScanCmd},
        mvm::{Mvm, MvmState},
        refs::RefType,
        types::{ScanRequest, SchedScanRequest, VifId},
    },
    log::{debug, error, info, warn},
    std::time::Duration,
};

/// Bound on waiting for the firmware to confirm an abort.
pub const SCAN_ABORT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    None,
    /// Scan requested by the upper stack.
    Os,
    /// Scheduled scan offloaded to the firmware.
    Sched,
}

impl Mvm {
    /// Issues an upper-stack scan. The caller has already cancelled any scheduled scan.
    pub(crate) fn scan_request(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        req: &ScanRequest,
    ) -> Result<(), Error> {
        if req.channels.is_empty() || req.channels.len() > self.config.n_scan_channels {
            return Err(Error::InvalidArgument("scan channel count"));
        }
        st.vif(vif_id)?;
        if st.scan_status != ScanStatus::None {
            return Err(Error::Busy("scan"));
        }
        self.refs.acquire(RefType::Scan);
        let cmd = ScanCmd {
            mac_id: vif_id,
            channels: req.channels.clone(),
            ssids: req.ssids.clone(),
            ies: req.ies.clone(),
        };
        let cmd = if self.config.lmac_scan_api {
            HostCommand::LmacScan(cmd)
        } else {
            HostCommand::ScanRequest(cmd)
        };
        if let Err(e) = self.send_cmd(cmd) {
            self.refs.release(RefType::Scan);
            return Err(e);
        }
        info!("scan started on {} channels", req.channels.len());
        st.scan_status = ScanStatus::Os;
        Ok(())
    }

    /// Aborts the upper-stack scan and waits for the firmware to confirm. Completion itself is
    /// reported by the async worker.
    pub(crate) fn cancel_scan(&self, st: &mut MvmState) -> Result<(), Error> {
        if st.scan_status != ScanStatus::Os {
            debug!("no scan to cancel");
            return Ok(());
        }
        let waiter = self.notif_wait.register(&[CommandId::ScanCompleteNotification], None);
        if let Err(e) = self.send_cmd(HostCommand::ScanAbort) {
            self.notif_wait.remove(waiter);
            return Err(e);
        }
        if let Err(e) = self.notif_wait.wait(waiter, SCAN_ABORT_TIMEOUT) {
            error!("scan abort not confirmed: {}", e);
            st.scan_status = ScanStatus::None;
            self.refs.release(RefType::Scan);
            self.stack.scan_completed(true);
            return Err(Error::Timeout("scan abort"));
        }
        Ok(())
    }

    /// Stops a scheduled scan. The status is reset even if the firmware never confirms.
    pub(crate) fn scan_offload_stop(&self, st: &mut MvmState, notify: bool) -> Result<(), Error> {
        if st.scan_status != ScanStatus::Sched {
            debug!("no scheduled scan to stop");
            return Ok(());
        }
        let waiter =
            self.notif_wait.register(&[CommandId::ScanOffloadCompleteNotification], None);
        let result = match self.send_cmd(HostCommand::ScanOffloadAbort) {
            Ok(_) => self.notif_wait.wait(waiter, SCAN_ABORT_TIMEOUT).map_err(|e| {
                error!("scheduled scan abort not confirmed: {}", e);
                Error::Timeout("scheduled scan abort")
            }),
            Err(e) => {
                self.notif_wait.remove(waiter);
                Err(e)
            }
        };
        st.scan_status = ScanStatus::None;
        if notify {
            self.stack.sched_scan_stopped();
        }
        result
    }

    /// Cancels a scan of the given kind, if one is running, then drains the async worker so no
    /// stale completion is observed afterwards. Must be called without the device mutex.
    pub(crate) fn cancel_scan_wait_notif(&self, kind: ScanStatus) -> Result<(), Error> {
        let result = {
            let mut st = self.state.lock();
            if st.scan_status != kind {
                return Ok(());
            }
            match kind {
                ScanStatus::Os => self.cancel_scan(&mut st),
                ScanStatus::Sched => self.scan_offload_stop(&mut st, true),
                ScanStatus::None => Ok(()),
            }
        };
        self.process_async_handlers();
        result
    }

    pub(crate) fn scan_offload_start(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        req: &SchedScanRequest,
    ) -> Result<(), Error> {
        let idle = if self.config.lmac_scan_api {
            st.vif(vif_id)?.bss_conf.idle
        } else {
            st.vifs().all(|v| v.bss_conf.idle)
        };
        if !idle {
            return Err(Error::Busy("scheduled scan while not idle"));
        }
        if st.scan_status != ScanStatus::None {
            return Err(Error::Busy("scan"));
        }
        st.scan_status = ScanStatus::Sched;

        let cmd = SchedScanCmd {
            mac_id: vif_id,
            channels: req.channels.clone(),
            interval_ms: req.interval_ms,
            ies: req.ies.clone(),
        };
        let result = self
            .send_cmd(HostCommand::SchedScanConfig(cmd.clone()))
            .and_then(|_| {
                self.send_cmd(HostCommand::SchedScanProfiles { match_sets: req.match_sets.clone() })
            })
            .and_then(|_| self.send_cmd(HostCommand::SchedScanStart(cmd)));
        if let Err(e) = result {
            st.scan_status = ScanStatus::None;
            return Err(e);
        }
        info!("scheduled scan started");
        Ok(())
    }

    /// Scan completion, run on the async worker.
    pub(crate) fn rx_scan_complete(&self, pkt: &Packet) {
        let aborted = match pkt.payload {
            PacketPayload::ScanComplete { aborted } => aborted,
            _ => false,
        };
        {
            let mut st = self.state.lock();
            if st.scan_status != ScanStatus::Os {
                warn!("scan completion while {:?}", st.scan_status);
                return;
            }
            st.scan_status = ScanStatus::None;
        }
        info!("scan completed{}", if aborted { " (aborted)" } else { "" });
        self.refs.release(RefType::Scan);
        self.stack.scan_completed(aborted);
    }

    pub(crate) fn rx_sched_scan_complete(&self) {
        {
            let mut st = self.state.lock();
            if st.scan_status != ScanStatus::Sched {
                debug!("scheduled scan already stopped");
                return;
            }
            st.scan_status = ScanStatus::None;
        }
        self.stack.sched_scan_stopped();
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            device::{RxHandler, StackEvent},
            testutil::TestHelper,
            types::{Channel, VifType},
        },
        assert_matches::assert_matches,
    };

    fn request(n: usize) -> ScanRequest {
        ScanRequest {
            channels: (1..=n as u8).map(Channel::new_2ghz).collect(),
            ..ScanRequest::default()
        }
    }

    fn sched_request() -> SchedScanRequest {
        SchedScanRequest {
            channels: vec![Channel::new_2ghz(1)],
            match_sets: vec![b"ssid".to_vec()],
            interval_ms: 1000,
            ies: vec![],
        }
    }

    fn station(h: &TestHelper) -> VifId {
        let mut st = h.mvm.state.lock();
        let vif = h.mvm.mac_ctxt_init(&mut st, &h.vif_params(VifType::Station)).expect("init");
        h.trans.clear();
        vif
    }

    #[test]
    fn channel_count_validated() {
        let h = TestHelper::started();
        let vif = station(&h);
        let mut st = h.mvm.state.lock();
        assert_matches!(
            h.mvm.scan_request(&mut st, vif, &request(0)),
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(
            h.mvm.scan_request(&mut st, vif, &request(41)),
            Err(Error::InvalidArgument(_))
        );
        assert!(h.trans.sent_ids().is_empty());
    }

    #[test]
    fn scan_completes_on_async_worker() {
        let h = TestHelper::started();
        let vif = station(&h);
        h.mvm.scan_request(&mut h.mvm.state.lock(), vif, &request(3)).expect("scan");
        assert_eq!(h.mvm.refs.count(RefType::Scan), 1);
        assert_matches!(
            h.mvm.scan_request(&mut h.mvm.state.lock(), vif, &request(3)),
            Err(Error::Busy(_))
        );

        h.mvm.rx_packet(&Packet::scan_complete(false));
        assert_eq!(h.mvm.state.lock().scan_status, ScanStatus::Os);
        h.mvm.process_async_handlers();
        assert_eq!(h.mvm.state.lock().scan_status, ScanStatus::None);
        assert_eq!(h.mvm.refs.count(RefType::Scan), 0);
        assert_eq!(h.stack.drain_events(), vec![StackEvent::ScanCompleted { aborted: false }]);
    }

    #[test]
    fn lmac_api_selects_command() {
        let h = TestHelper::with_config(crate::config::MvmConfig {
            lmac_scan_api: true,
            ..Default::default()
        });
        let vif = station(&h);
        h.mvm.scan_request(&mut h.mvm.state.lock(), vif, &request(1)).expect("scan");
        assert_eq!(h.trans.sent_ids(), vec![CommandId::LmacScan]);
    }

    #[test]
    fn rejected_scan_releases_reference() {
        let h = TestHelper::started();
        let vif = station(&h);
        h.trans.reject(CommandId::ScanRequest, 1);
        assert!(h.mvm.scan_request(&mut h.mvm.state.lock(), vif, &request(1)).is_err());
        assert_eq!(h.mvm.refs.count(RefType::Scan), 0);
        assert_eq!(h.mvm.state.lock().scan_status, ScanStatus::None);
    }

    #[test]
    fn cancel_waits_and_drains() {
        let h = TestHelper::started();
        let vif = station(&h);
        h.mvm.scan_request(&mut h.mvm.state.lock(), vif, &request(2)).expect("scan");
        h.mvm.cancel_scan_wait_notif(ScanStatus::Os).expect("cancel");
        assert_eq!(h.mvm.state.lock().scan_status, ScanStatus::None);
        assert_eq!(h.mvm.refs.count(RefType::Scan), 0);
        assert_eq!(h.stack.drain_events(), vec![StackEvent::ScanCompleted { aborted: true }]);
    }

    #[test]
    fn unconfirmed_abort_times_out() {
        let h = TestHelper::started();
        let vif = station(&h);
        h.trans.state.lock().complete_scan_on_abort = false;
        let mut st = h.mvm.state.lock();
        h.mvm.scan_request(&mut st, vif, &request(2)).expect("scan");
        assert_matches!(h.mvm.cancel_scan(&mut st), Err(Error::Timeout(_)));
        assert_eq!(st.scan_status, ScanStatus::None);
        assert_eq!(h.mvm.refs.count(RefType::Scan), 0);
    }

    #[test]
    fn sched_scan_requires_idle() {
        let h = TestHelper::started();
        let vif = station(&h);
        let mut st = h.mvm.state.lock();
        st.vif_mut(vif).expect("vif").bss_conf.idle = false;
        assert_matches!(
            h.mvm.scan_offload_start(&mut st, vif, &sched_request()),
            Err(Error::Busy(_))
        );
        assert_eq!(st.scan_status, ScanStatus::None);
    }

    #[test]
    fn sched_scan_failure_resets_status() {
        let h = TestHelper::started();
        let vif = station(&h);
        h.trans.reject(CommandId::SchedScanStart, 1);
        let mut st = h.mvm.state.lock();
        assert!(h.mvm.scan_offload_start(&mut st, vif, &sched_request()).is_err());
        assert_eq!(st.scan_status, ScanStatus::None);
        assert_eq!(
            h.trans.sent_ids(),
            vec![
                CommandId::SchedScanConfig,
                CommandId::SchedScanProfiles,
                CommandId::SchedScanStart
            ]
        );
    }

    #[test]
    fn offload_stop_notifies_once() {
        let h = TestHelper::started();
        let vif = station(&h);
        h.mvm.scan_offload_start(&mut h.mvm.state.lock(), vif, &sched_request()).expect("start");
        h.mvm.cancel_scan_wait_notif(ScanStatus::Sched).expect("stop");
        assert_eq!(h.mvm.state.lock().scan_status, ScanStatus::None);
        // The queued completion is ignored by the worker since the status is already reset.
        assert_eq!(h.stack.drain_events(), vec![StackEvent::SchedScanStopped]);
    }
}
