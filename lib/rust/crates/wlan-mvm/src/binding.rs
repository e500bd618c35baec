// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        error::Error,
        fw_api::{BindingCmd, FwAction, HostCommand},
        mvm::{Mvm, MvmState},
        types::{PhyCtxtId, VifId, MAX_MACS_IN_BINDING, NUM_PHY_CTX},
    },
    log::{debug, warn},
};

/// MAC contexts bound to each PHY context, in firmware order. A binding shares the id of its
/// PHY context.
pub struct Bindings {
    macs: Vec<Vec<VifId>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self { macs: vec![vec![]; NUM_PHY_CTX] }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn macs(&self, phy: PhyCtxtId) -> &[VifId] {
        self.macs.get(phy.index()).map(|m| &m[..]).unwrap_or(&[])
    }

    pub fn bound_phy(&self, vif: VifId) -> Option<PhyCtxtId> {
        self.macs.iter().position(|macs| macs.contains(&vif)).map(|i| PhyCtxtId(i as u8))
    }

    pub fn is_bound(&self, vif: VifId) -> bool {
        self.bound_phy(vif).is_some()
    }

    /// PHY contexts with at least one bound MAC.
    pub fn active(&self) -> impl Iterator<Item = (PhyCtxtId, &[VifId])> {
        self.macs
            .iter()
            .enumerate()
            .filter(|(_, macs)| !macs.is_empty())
            .map(|(i, macs)| (PhyCtxtId(i as u8), &macs[..]))
    }
}

impl Mvm {
    fn send_binding(&self, phy: PhyCtxtId, action: FwAction, macs: &[VifId]) -> Result<(), Error> {
        debug!("binding {} {:?} macs {:?}", phy.0, action, macs);
        self.send_cmd(HostCommand::Binding(BindingCmd {
            id: phy,
            action,
            phy,
            macs: macs.to_vec(),
        }))?;
        Ok(())
    }

    pub(crate) fn binding_add_vif(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let vif = st.vif(vif_id)?;
        if !vif.uploaded {
            return Err(Error::violation(format!("binding MAC {} before upload", vif_id.0)));
        }
        let phy = vif
            .phy_ctxt
            .ok_or_else(|| Error::violation(format!("binding MAC {} without PHY", vif_id.0)))?;
        if st.bindings.is_bound(vif_id) {
            return Err(Error::violation(format!("MAC {} is already bound", vif_id.0)));
        }
        let current = st.bindings.macs(phy);
        if current.len() >= MAX_MACS_IN_BINDING {
            return Err(Error::ResourceExhausted("binding"));
        }
        let action = if current.is_empty() { FwAction::Add } else { FwAction::Modify };
        let mut macs = current.to_vec();
        macs.push(vif_id);
        self.send_binding(phy, action, &macs)?;
        st.bindings.macs[phy.index()] = macs;
        Ok(())
    }

    /// Unbinds the interface. Local state is updated even if the firmware refuses, so the PHY
    /// context can still be released by the caller.
    pub(crate) fn binding_remove_vif(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let phy = st
            .bindings
            .bound_phy(vif_id)
            .ok_or_else(|| Error::violation(format!("MAC {} is not bound", vif_id.0)))?;
        if st.vif(vif_id)?.phy_ctxt != Some(phy) {
            warn!("MAC {} bound to PHY {} it no longer references", vif_id.0, phy.0);
        }
        let macs: Vec<VifId> =
            st.bindings.macs(phy).iter().cloned().filter(|&v| v != vif_id).collect();
        let action = if macs.is_empty() { FwAction::Remove } else { FwAction::Modify };
        let result = self.send_binding(phy, action, &macs);
        st.bindings.macs[phy.index()] = macs;
        result
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{fw_api::CommandId, testutil::TestHelper, types::VifType},
        assert_matches::assert_matches,
    };

    fn uploaded_station(h: &TestHelper, st: &mut MvmState, phy: PhyCtxtId) -> VifId {
        let vif = h.mvm.mac_ctxt_init(st, &h.vif_params(VifType::Station)).expect("init vif");
        h.mvm.mac_ctxt_add(st, vif).expect("add mac");
        st.vif_mut(vif).expect("vif exists").phy_ctxt = Some(phy);
        vif
    }

    fn binding_cmds(h: &TestHelper) -> Vec<BindingCmd> {
        h.trans
            .drain_commands()
            .into_iter()
            .filter_map(|cmd| match cmd {
                HostCommand::Binding(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_add_then_modify_then_remove() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let a = uploaded_station(&h, &mut st, PhyCtxtId(0));
        let b = uploaded_station(&h, &mut st, PhyCtxtId(0));
        h.trans.clear();

        h.mvm.binding_add_vif(&mut st, a).expect("bind a");
        h.mvm.binding_add_vif(&mut st, b).expect("bind b");
        h.mvm.binding_remove_vif(&mut st, a).expect("unbind a");
        h.mvm.binding_remove_vif(&mut st, b).expect("unbind b");

        let cmds = binding_cmds(&h);
        let summary: Vec<_> = cmds.iter().map(|c| (c.action, c.macs.clone())).collect();
        assert_eq!(
            summary,
            vec![
                (FwAction::Add, vec![a]),
                (FwAction::Modify, vec![a, b]),
                (FwAction::Modify, vec![b]),
                (FwAction::Remove, vec![]),
            ]
        );
        assert!(!st.bindings.is_bound(a));
    }

    #[test]
    fn requires_upload_and_phy() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let vif = h.mvm.mac_ctxt_init(&mut st, &h.vif_params(VifType::Station)).expect("init");
        st.vif_mut(vif).expect("vif").phy_ctxt = Some(PhyCtxtId(0));
        assert_matches!(h.mvm.binding_add_vif(&mut st, vif), Err(Error::ProtocolViolation(_)));

        h.mvm.mac_ctxt_add(&mut st, vif).expect("add mac");
        st.vif_mut(vif).expect("vif").phy_ctxt = None;
        assert_matches!(h.mvm.binding_add_vif(&mut st, vif), Err(Error::ProtocolViolation(_)));
        assert!(!st.bindings.is_bound(vif));
    }

    #[test]
    fn double_bind_is_violation() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let vif = uploaded_station(&h, &mut st, PhyCtxtId(1));
        h.mvm.binding_add_vif(&mut st, vif).expect("bind");
        assert_matches!(h.mvm.binding_add_vif(&mut st, vif), Err(Error::ProtocolViolation(_)));
        assert_eq!(st.bindings.macs(PhyCtxtId(1)), &[vif]);
    }

    #[test]
    fn rejected_add_is_not_recorded() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let vif = uploaded_station(&h, &mut st, PhyCtxtId(2));
        h.trans.reject(CommandId::Binding, 1);
        assert_matches!(
            h.mvm.binding_add_vif(&mut st, vif),
            Err(Error::FirmwareRejected { cmd: CommandId::Binding, .. })
        );
        assert!(!st.bindings.is_bound(vif));
    }

    #[test]
    fn unbind_unbound_is_violation() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let vif = uploaded_station(&h, &mut st, PhyCtxtId(0));
        assert_matches!(h.mvm.binding_remove_vif(&mut st, vif), Err(Error::ProtocolViolation(_)));
    }
}
