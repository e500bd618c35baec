// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! One-shot waiters for firmware packets.
//!
//! A waiter is registered *before* the command that provokes the packet is sent. Its optional
//! matcher runs in the receive path, so it may record data from the packet (a time event uid,
//! for instance) before the waiting thread resumes. A matcher returning false keeps the waiter
//! armed for the next packet with one of its command ids.

use {
    crate::{
        error::{Error, TransportError},
        fw_api::{CommandId, Packet},
    },
    log::debug,
    parking_lot::{Condvar, Mutex},
    std::time::{Duration, Instant},
};

pub type Matcher = Box<dyn FnMut(&Packet) -> bool + Send>;

struct Waiter {
    id: u64,
    cmds: Vec<CommandId>,
    matcher: Option<Matcher>,
    triggered: bool,
    aborted: bool,
}

#[derive(Default)]
struct Waiters {
    next_id: u64,
    list: Vec<Waiter>,
}

/// Handle of a registered waiter. Must be consumed by `wait` or `remove`.
#[must_use]
#[derive(Debug)]
pub struct WaitHandle(u64);

pub struct NotifWait {
    waiters: Mutex<Waiters>,
    cond: Condvar,
}

impl NotifWait {
    pub fn new() -> Self {
        Self { waiters: Mutex::new(Waiters::default()), cond: Condvar::new() }
    }

    pub fn register(&self, cmds: &[CommandId], matcher: Option<Matcher>) -> WaitHandle {
        let mut waiters = self.waiters.lock();
        let id = waiters.next_id;
        waiters.next_id += 1;
        waiters.list.push(Waiter {
            id,
            cmds: cmds.to_vec(),
            matcher,
            triggered: false,
            aborted: false,
        });
        WaitHandle(id)
    }

    /// Runs every armed waiter interested in `pkt`. Called from the receive path.
    pub fn notify(&self, pkt: &Packet) {
        let mut triggered = false;
        {
            let mut waiters = self.waiters.lock();
            for waiter in waiters.list.iter_mut() {
                if waiter.triggered || waiter.aborted || !waiter.cmds.contains(&pkt.cmd) {
                    continue;
                }
                let done = match waiter.matcher.as_mut() {
                    Some(matcher) => matcher(pkt),
                    None => true,
                };
                if done {
                    waiter.triggered = true;
                    triggered = true;
                }
            }
        }
        if triggered {
            self.cond.notify_all();
        }
    }

    /// Blocks until the waiter triggers, is aborted, or `timeout` elapses. The waiter is removed
    /// in every case.
    pub fn wait(&self, handle: WaitHandle, timeout: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + timeout;
        let mut waiters = self.waiters.lock();
        let result = loop {
            let (triggered, aborted) = match waiters.list.iter().find(|w| w.id == handle.0) {
                Some(w) => (w.triggered, w.aborted),
                None => break Err(Error::violation(format!("unknown waiter {}", handle.0))),
            };
            if aborted {
                break Err(Error::Transport(TransportError::DeviceStopped));
            }
            if triggered {
                break Ok(());
            }
            if self.cond.wait_until(&mut waiters, deadline).timed_out() {
                let triggered = waiters.list.iter().any(|w| w.id == handle.0 && w.triggered);
                break if triggered { Ok(()) } else { Err(Error::Timeout("firmware notification")) };
            }
        };
        waiters.list.retain(|w| w.id != handle.0);
        result
    }

    pub fn remove(&self, handle: WaitHandle) {
        self.waiters.lock().list.retain(|w| w.id != handle.0);
    }

    /// Fails every pending wait. Used when the firmware goes away.
    pub fn abort_all(&self) {
        {
            let mut waiters = self.waiters.lock();
            if !waiters.list.is_empty() {
                debug!("aborting {} notification waiters", waiters.list.len());
            }
            for waiter in waiters.list.iter_mut() {
                waiter.aborted = true;
            }
        }
        self.cond.notify_all();
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.waiters.lock().list.len()
    }
}
