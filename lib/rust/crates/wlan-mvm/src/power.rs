// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        error::Error,
        fw_api::{BeaconFilterCmd, HostCommand, MacPower},
        mac_ctxt::Vif,
        mvm::{Mvm, MvmState},
        types::{VifId, VifType},
    },
    log::debug,
};

impl Mvm {
    fn vif_ps_enabled(&self, st: &MvmState, vif: &Vif) -> bool {
        self.config.power_save_enabled
            && !st.ps_disabled
            && !vif.ps_disabled
            && vif.vif_type.is_managed()
            && vif.associated
            && vif.bss_conf.ps
            && self.stations.tdls_count(Some(vif.id)) == 0
    }

    /// Pushes the power-save table of every uploaded MAC context.
    pub(crate) fn power_update_mac(&self, st: &mut MvmState) -> Result<(), Error> {
        // An interface that disabled power save, such as a monitor, keeps the whole device awake.
        let ps_disabled = st.vifs().any(|v| v.ps_disabled);
        st.ps_disabled = ps_disabled;
        let table: Vec<MacPower> = {
            let st: &MvmState = st;
            st.vifs()
                .filter(|v| v.uploaded)
                .map(|v| MacPower { mac_id: v.id, ps_enabled: self.vif_ps_enabled(st, v) })
                .collect()
        };
        if table.is_empty() {
            return Ok(());
        }
        debug!("power table {:?}", table);
        self.send_cmd(HostCommand::MacPmPowerTable(table))?;
        Ok(())
    }

    /// Beacon filtering only applies to the interface allowed to use it.
    fn bf_eligible(st: &MvmState, vif: &Vif) -> bool {
        st.bf_allowed_vif == Some(vif.id) && vif.vif_type == VifType::Station
    }

    pub(crate) fn enable_beacon_filter(&self, st: &mut MvmState, vif_id: VifId) -> Result<(), Error> {
        let vif = st.vif(vif_id)?;
        if !Self::bf_eligible(st, vif) {
            return Ok(());
        }
        self.send_cmd(HostCommand::BeaconFilter(BeaconFilterCmd { mac_id: vif_id, enable: true }))?;
        st.vif_mut(vif_id)?.bf_enabled = true;
        Ok(())
    }

    pub(crate) fn disable_beacon_filter(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
    ) -> Result<(), Error> {
        let vif = st.vif(vif_id)?;
        if !Self::bf_eligible(st, vif) {
            return Ok(());
        }
        self.send_cmd(HostCommand::BeaconFilter(BeaconFilterCmd {
            mac_id: vif_id,
            enable: false,
        }))?;
        st.vif_mut(vif_id)?.bf_enabled = false;
        Ok(())
    }

    pub(crate) fn set_tx_power(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        limit_dbm: i8,
    ) -> Result<(), Error> {
        st.vif(vif_id)?;
        self.send_cmd(HostCommand::ReduceTxPower { mac_id: vif_id, limit_dbm })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{fw_api::CommandId, testutil::TestHelper},
    };

    fn uploaded(h: &TestHelper, st: &mut MvmState, vif_type: VifType) -> VifId {
        let vif = h.mvm.mac_ctxt_init(st, &h.vif_params(vif_type)).expect("init");
        h.mvm.mac_ctxt_add(st, vif).expect("add");
        vif
    }

    fn power_tables(h: &TestHelper) -> Vec<Vec<MacPower>> {
        h.trans
            .drain_commands()
            .into_iter()
            .filter_map(|cmd| match cmd {
                HostCommand::MacPmPowerTable(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn no_uploaded_macs_sends_nothing() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        h.trans.clear();
        h.mvm.power_update_mac(&mut st).expect("update");
        assert!(h.trans.sent_ids().is_empty());
    }

    #[test]
    fn associated_station_with_ps() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let vif = uploaded(&h, &mut st, VifType::Station);
        {
            let v = st.vif_mut(vif).expect("vif");
            v.associated = true;
            v.bss_conf.ps = true;
        }
        h.trans.clear();
        h.mvm.power_update_mac(&mut st).expect("update");
        assert_eq!(power_tables(&h), vec![vec![MacPower { mac_id: vif, ps_enabled: true }]]);
    }

    #[test]
    fn monitor_disables_ps_everywhere() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let sta = uploaded(&h, &mut st, VifType::Station);
        let mon = uploaded(&h, &mut st, VifType::Monitor);
        {
            let v = st.vif_mut(sta).expect("sta");
            v.associated = true;
            v.bss_conf.ps = true;
        }
        st.vif_mut(mon).expect("mon").ps_disabled = true;
        h.trans.clear();
        h.mvm.power_update_mac(&mut st).expect("update");
        assert!(st.ps_disabled);
        assert_eq!(
            power_tables(&h),
            vec![vec![
                MacPower { mac_id: sta, ps_enabled: false },
                MacPower { mac_id: mon, ps_enabled: false },
            ]]
        );
    }

    #[test]
    fn beacon_filter_only_for_allowed_station() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        let sta = uploaded(&h, &mut st, VifType::Station);
        h.trans.clear();

        h.mvm.enable_beacon_filter(&mut st, sta).expect("not eligible is not an error");
        assert!(h.trans.sent_ids().is_empty());

        st.bf_allowed_vif = Some(sta);
        h.mvm.enable_beacon_filter(&mut st, sta).expect("enable");
        assert!(st.vif(sta).expect("sta").bf_enabled);
        h.mvm.disable_beacon_filter(&mut st, sta).expect("disable");
        assert!(!st.vif(sta).expect("sta").bf_enabled);
        assert_eq!(h.trans.sent_ids(), vec![CommandId::BeaconFilter, CommandId::BeaconFilter]);
    }
}
