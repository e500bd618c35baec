// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    bitflags::bitflags,
    parking_lot::{Condvar, Mutex},
    std::time::{Duration, Instant},
};

bitflags! {
    pub struct StatusFlags: u32 {
        const HW_RFKILL = 1 << 0;
        const HW_CTKILL = 1 << 1;
        const ROC_RUNNING = 1 << 2;
        const IN_HW_RESTART = 1 << 3;
        const IN_D0I3 = 1 << 4;
        const ROC_AUX_RUNNING = 1 << 5;
        const FIRMWARE_DOWN = 1 << 6;
    }
}

/// Device-wide status bits. Readable from any context; waiters are woken on every change.
pub struct Status {
    flags: Mutex<StatusFlags>,
    changed: Condvar,
}

impl Status {
    pub fn new(initial: StatusFlags) -> Self {
        Self { flags: Mutex::new(initial), changed: Condvar::new() }
    }

    pub fn get(&self) -> StatusFlags {
        *self.flags.lock()
    }

    pub fn test(&self, flags: StatusFlags) -> bool {
        self.flags.lock().intersects(flags)
    }

    pub fn set(&self, flags: StatusFlags) {
        self.flags.lock().insert(flags);
        self.changed.notify_all();
    }

    pub fn clear(&self, flags: StatusFlags) {
        self.flags.lock().remove(flags);
        self.changed.notify_all();
    }

    /// Clears `flags` and returns whether any of them was set.
    pub fn test_and_clear(&self, flags: StatusFlags) -> bool {
        let was_set = {
            let mut current = self.flags.lock();
            let was_set = current.intersects(flags);
            current.remove(flags);
            was_set
        };
        self.changed.notify_all();
        was_set
    }

    /// Blocks until none of `flags` is set or `timeout` elapses. Returns false on timeout.
    pub fn wait_clear(&self, flags: StatusFlags, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut current = self.flags.lock();
        while current.intersects(flags) {
            if self.changed.wait_until(&mut current, deadline).timed_out() {
                return !current.intersects(flags);
            }
        }
        true
    }

    pub fn is_radio_killed(&self) -> bool {
        self.test(StatusFlags::HW_RFKILL | StatusFlags::HW_CTKILL)
    }
}
