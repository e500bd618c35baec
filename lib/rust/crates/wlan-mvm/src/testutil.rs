// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Shared helpers for unit tests.

use {
    crate::{
        config::MvmConfig,
        device::{FakeRateControl, FakeStack, FakeTransport},
        mvm::Mvm,
        ops::MacOps,
        types::{VifParams, VifType},
    },
    std::sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc,
    },
};

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        println!("[{}] {}", record.level(), record.args())
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;

static LOGGER_ONCE: AtomicBool = AtomicBool::new(true);

/// Install a logger for tests.
///
/// This function sets global program state, so all tests that run after this
/// function is called will use the logger.
pub(crate) fn set_logger_for_test() {
    // log::set_logger will fail if called multiple times.
    if LOGGER_ONCE.swap(false, Ordering::AcqRel) {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Trace);
    }
}

pub(crate) struct TestHelper {
    pub mvm: Arc<Mvm>,
    pub trans: Arc<FakeTransport>,
    pub stack: Arc<FakeStack>,
    pub rate: Arc<FakeRateControl>,
    next_addr: AtomicU8,
}

impl TestHelper {
    /// A core whose firmware has not been started.
    pub fn new() -> Self {
        Self::with_config_stopped(MvmConfig::default())
    }

    /// A core with running firmware. Start-up commands are left in the transport log.
    pub fn started() -> Self {
        Self::with_config(MvmConfig::default())
    }

    pub fn with_config(config: MvmConfig) -> Self {
        let h = Self::with_config_stopped(config);
        h.mvm.start().expect("firmware start should succeed");
        h
    }

    fn with_config_stopped(config: MvmConfig) -> Self {
        set_logger_for_test();
        let trans = FakeTransport::new();
        let stack = FakeStack::new();
        let rate = FakeRateControl::new();
        let mvm = Mvm::new(config, trans.clone(), rate.clone(), stack.clone());
        Self { mvm, trans, stack, rate, next_addr: AtomicU8::new(1) }
    }

    /// Interface parameters with an address no other interface of this helper uses.
    pub fn vif_params(&self, vif_type: VifType) -> VifParams {
        let n = self.next_addr.fetch_add(1, Ordering::Relaxed);
        VifParams { vif_type, addr: [0x02, 0, 0, 0, 0, n] }
    }
}
