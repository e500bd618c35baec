// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        config::MvmConfig,
        device::Transport,
        error::Error,
        status::{Status, StatusFlags},
    },
    log::{debug, error},
    parking_lot::Mutex,
    std::{sync::Arc, time::Duration},
};

/// Reasons for keeping the firmware out of its low-power state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RefType {
    UcodeDown,
    Scan,
    Roc,
    RocAux,
    P2pClient,
    ApIbss,
    User,
    Tx,
    TxAgg,
    AddIf,
    StartAp,
    BssChanged,
    PrepareTx,
    ProtectTdls,
    CheckCtkill,
    PrphRead,
    PrphWrite,
    NmiInterrupt,
    TmCmd,
    ExitWork,
    ProtectCsa,
    FwDbgCollect,
}

impl RefType {
    pub const COUNT: usize = 22;

    pub const ALL: [RefType; RefType::COUNT] = [
        RefType::UcodeDown,
        RefType::Scan,
        RefType::Roc,
        RefType::RocAux,
        RefType::P2pClient,
        RefType::ApIbss,
        RefType::User,
        RefType::Tx,
        RefType::TxAgg,
        RefType::AddIf,
        RefType::StartAp,
        RefType::BssChanged,
        RefType::PrepareTx,
        RefType::ProtectTdls,
        RefType::CheckCtkill,
        RefType::PrphRead,
        RefType::PrphWrite,
        RefType::NmiInterrupt,
        RefType::TmCmd,
        RefType::ExitWork,
        RefType::ProtectCsa,
        RefType::FwDbgCollect,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

pub struct RefCounter {
    refs: Mutex<[u32; RefType::COUNT]>,
    trans: Arc<dyn Transport>,
    status: Arc<Status>,
    enabled: bool,
    sync_timeout: Duration,
}

impl RefCounter {
    pub fn new(trans: Arc<dyn Transport>, status: Arc<Status>, config: &MvmConfig) -> Self {
        Self {
            refs: Mutex::new([0; RefType::COUNT]),
            trans,
            status,
            enabled: config.d0i3_supported,
            sync_timeout: config.ref_sync_timeout(),
        }
    }

    pub fn acquire(&self, ref_type: RefType) {
        if !self.enabled {
            return;
        }
        debug!("take mvm reference {:?}", ref_type);
        self.refs.lock()[ref_type.index()] += 1;
        self.trans.ref_device();
    }

    pub fn release(&self, ref_type: RefType) {
        if !self.enabled {
            return;
        }
        debug!("leave mvm reference {:?}", ref_type);
        {
            let mut refs = self.refs.lock();
            let count = &mut refs[ref_type.index()];
            if *count == 0 {
                error!("reference {:?} released more often than taken", ref_type);
                return;
            }
            *count -= 1;
        }
        self.trans.unref_device();
    }

    /// Takes a reference and waits for any low-power exit in flight to finish. On timeout the
    /// reference is given back before failing.
    pub fn acquire_sync(&self, ref_type: RefType) -> Result<(), Error> {
        self.acquire(ref_type);
        if self.status.wait_clear(StatusFlags::IN_D0I3, self.sync_timeout) {
            return Ok(());
        }
        error!("timed out leaving low-power state for {:?}", ref_type);
        self.release(ref_type);
        Err(Error::Timeout("low-power exit"))
    }

    /// Drops every reference except `keep`. Only valid while restarting the firmware.
    pub fn release_all_except(&self, keep: Option<RefType>) {
        if !self.enabled {
            return;
        }
        let mut released = 0;
        {
            let mut refs = self.refs.lock();
            for ref_type in RefType::ALL.iter().cloned() {
                if Some(ref_type) == keep {
                    continue;
                }
                let count = &mut refs[ref_type.index()];
                if *count > 0 {
                    debug!("dropping {} references of {:?}", count, ref_type);
                }
                released += *count;
                *count = 0;
            }
        }
        for _ in 0..released {
            self.trans.unref_device();
        }
    }

    pub fn count(&self, ref_type: RefType) -> u32 {
        self.refs.lock()[ref_type.index()]
    }

    pub fn total(&self) -> u32 {
        self.refs.lock().iter().sum()
    }
}
