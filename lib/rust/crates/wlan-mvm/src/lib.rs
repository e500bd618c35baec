// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! MAC-state and firmware-command lifecycle manager for MVM-class WLAN firmware.
//!
//! The crate sits between a generic 802.11 stack and a firmware-driven radio. The upper stack
//! drives it through [`MacOps`], implemented once by [`Mvm`]. The device transport, the rate
//! control service and the upper stack's event sink are supplied by the embedder through the
//! traits in [`device`].

pub mod binding;
pub mod config;
pub mod device;
pub mod error;
pub mod fw_api;
pub mod key;
pub mod mac_ctxt;
pub mod mcast;
pub mod mvm;
pub mod notif_wait;
pub mod ops;
pub mod phy_ctxt;
pub mod power;
pub mod quota;
pub mod refs;
pub mod scan;
pub mod sta;
pub mod status;
pub mod time_event;
pub mod types;

#[cfg(test)]
mod testutil;

pub use {
    crate::{
        config::MvmConfig,
        device::{RateControl, RxHandler, StackEvents, Transport},
        error::{Error, TransportError},
        mvm::Mvm,
        ops::MacOps,
    },
};
