// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        error::Error,
        fw_api::{BindingQuota, HostCommand, QuotaCmd, QUOTA_100},
        mac_ctxt::Vif,
        mvm::{Mvm, MvmState},
        types::{VifId, VifType},
    },
    log::debug,
};

/// Whether the interface needs air time on its binding.
fn needs_quota(vif: &Vif) -> bool {
    match vif.vif_type {
        VifType::Station | VifType::P2pClient => vif.associated,
        VifType::Ap | VifType::P2pGo | VifType::Adhoc => vif.ap_ibss_active,
        VifType::Monitor => vif.monitor_active,
        // Uses time events instead.
        VifType::P2pDevice => false,
    }
}

/// Splits the full quota evenly between bindings with an active interface. Rounding leftovers
/// go to the first binding.
pub(crate) fn compute_quotas(st: &MvmState, disabled_vif: Option<VifId>) -> QuotaCmd {
    let active: Vec<_> = st
        .bindings
        .active()
        .filter(|(_, macs)| {
            macs.iter().any(|&id| {
                Some(id) != disabled_vif && st.vif(id).map(needs_quota).unwrap_or(false)
            })
        })
        .map(|(phy, _)| phy)
        .collect();
    if active.is_empty() {
        return QuotaCmd { quotas: vec![] };
    }
    let n = active.len() as u32;
    let share = QUOTA_100 / n;
    let remainder = QUOTA_100 % n;
    let quotas = active
        .into_iter()
        .enumerate()
        .map(|(i, id)| BindingQuota {
            id,
            quota: if i == 0 { share + remainder } else { share },
            max_duration: 0,
        })
        .collect();
    QuotaCmd { quotas }
}

impl Mvm {
    /// Recomputes the time-sharing quota. `disabled_vif` is treated as inactive, for use right
    /// before it is taken down. Unchanged quotas are not resent.
    pub(crate) fn update_quotas(
        &self,
        st: &mut MvmState,
        disabled_vif: Option<VifId>,
    ) -> Result<(), Error> {
        let cmd = compute_quotas(st, disabled_vif);
        if st.last_quota_cmd.as_ref() == Some(&cmd) {
            debug!("quota unchanged");
            return Ok(());
        }
        self.send_cmd(HostCommand::Quota(cmd.clone()))?;
        st.last_quota_cmd = Some(cmd);
        Ok(())
    }
}
