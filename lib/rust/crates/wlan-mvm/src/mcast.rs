// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        fw_api::{HostCommand, McastFilterCmd},
        mvm::{Mvm, MvmState},
        types::{MacAddr, VifType},
    },
    log::{error, warn},
};

pub const MAX_MCAST_FILTERING_ADDRESSES: usize = 256;

/// Firmware only filters on the first two MAC ids.
pub const MAX_PORT_ID_NUM: u8 = 2;

/// Multicast filter programmed on associated station interfaces. Replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct McastFilter {
    pub pass_all: bool,
    pub addrs: Vec<MacAddr>,
}

impl McastFilter {
    /// Falls back to passing everything when the list does not fit.
    pub fn from_addrs(addrs: &[MacAddr], force_pass_all: bool) -> Self {
        if force_pass_all || addrs.len() > MAX_MCAST_FILTERING_ADDRESSES {
            Self { pass_all: true, addrs: vec![] }
        } else {
            Self { pass_all: false, addrs: addrs.to_vec() }
        }
    }
}

impl Mvm {
    /// Sends the current filter to every associated station interface, then fences the
    /// asynchronous updates with a synchronous echo.
    pub(crate) fn recalc_multicast(&self, st: &MvmState) {
        let filter = st.mcast_filter.clone();
        for vif in st.vifs().filter(|v| v.vif_type == VifType::Station && v.associated) {
            if vif.id.0 >= MAX_PORT_ID_NUM {
                warn!("MAC {} cannot filter multicast", vif.id.0);
                continue;
            }
            let cmd = HostCommand::McastFilter(McastFilterCmd {
                port_id: vif.id.0,
                bssid: vif.bssid,
                pass_all: filter.pass_all,
                addrs: filter.addrs.clone(),
            });
            if let Err(e) = self.send_cmd_async(cmd) {
                error!("failed to send multicast filter to MAC {}: {}", vif.id.0, e);
            }
        }
        if let Err(e) = self.send_cmd(HostCommand::Echo) {
            error!("multicast filter echo failed: {}", e);
        }
    }
}
