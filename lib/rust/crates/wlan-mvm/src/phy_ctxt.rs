// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        error::Error,
        fw_api::{FwAction, HostCommand, PhyContextCmd},
        mvm::{Mvm, MvmState},
        types::{ChanDef, ChanctxConf, Channel, PhyCtxtId, DEFAULT_CHAN_DEF, NUM_PHY_CTX},
    },
    log::debug,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyContext {
    pub id: PhyCtxtId,
    /// Interfaces currently using this context.
    pub ref_count: u32,
    pub def: ChanDef,
    pub rx_chains_static: u8,
    pub rx_chains_dynamic: u8,
}

impl PhyContext {
    fn new(id: PhyCtxtId) -> Self {
        Self { id, ref_count: 0, def: DEFAULT_CHAN_DEF, rx_chains_static: 1, rx_chains_dynamic: 1 }
    }

    pub fn conf(&self) -> ChanctxConf {
        ChanctxConf {
            def: self.def,
            rx_chains_static: self.rx_chains_static,
            rx_chains_dynamic: self.rx_chains_dynamic,
        }
    }
}

pub struct PhyContextPool {
    ctxts: Vec<PhyContext>,
}

impl PhyContextPool {
    pub fn new() -> Self {
        Self { ctxts: (0..NUM_PHY_CTX).map(|i| PhyContext::new(PhyCtxtId(i as u8))).collect() }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn get(&self, id: PhyCtxtId) -> Result<&PhyContext, Error> {
        self.ctxts
            .get(id.index())
            .ok_or_else(|| Error::violation(format!("no PHY context {}", id.0)))
    }

    fn get_mut(&mut self, id: PhyCtxtId) -> Result<&mut PhyContext, Error> {
        self.ctxts
            .get_mut(id.index())
            .ok_or_else(|| Error::violation(format!("no PHY context {}", id.0)))
    }

    pub fn get_free(&self) -> Result<PhyCtxtId, Error> {
        self.ctxts
            .iter()
            .find(|ctxt| ctxt.ref_count == 0)
            .map(|ctxt| ctxt.id)
            .ok_or(Error::ResourceExhausted("PHY context"))
    }

    pub fn ref_ctxt(&mut self, id: PhyCtxtId) -> Result<(), Error> {
        self.get_mut(id)?.ref_count += 1;
        Ok(())
    }

    pub fn unref_ctxt(&mut self, id: PhyCtxtId) -> Result<(), Error> {
        let ctxt = self.get_mut(id)?;
        if ctxt.ref_count == 0 {
            return Err(Error::violation(format!("PHY context {} is not referenced", id.0)));
        }
        ctxt.ref_count -= 1;
        Ok(())
    }

    /// Number of contexts in use by at least one interface.
    pub fn active_count(&self) -> usize {
        self.ctxts.iter().filter(|ctxt| ctxt.ref_count > 0).count()
    }

    pub fn total_refs(&self) -> u32 {
        self.ctxts.iter().map(|ctxt| ctxt.ref_count).sum()
    }

    /// A referenced context other than `exclude` already tuned to `chan`.
    pub fn find_on_channel(&self, chan: Channel, exclude: Option<PhyCtxtId>) -> Option<PhyCtxtId> {
        self.ctxts
            .iter()
            .find(|ctxt| ctxt.ref_count > 0 && ctxt.def.chan == chan && Some(ctxt.id) != exclude)
            .map(|ctxt| ctxt.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhyContext> {
        self.ctxts.iter()
    }
}

fn phy_ctxt_cmd(id: PhyCtxtId, action: FwAction, conf: &ChanctxConf) -> HostCommand {
    HostCommand::PhyContext(PhyContextCmd {
        id,
        action,
        def: conf.def,
        rx_chains_static: conf.rx_chains_static,
        rx_chains_dynamic: conf.rx_chains_dynamic,
        apply_time: 0,
    })
}

impl Mvm {
    /// Uploads every PHY context with the default channel. Done once per firmware start.
    pub(crate) fn phy_ctxt_add_all(&self, st: &mut MvmState) -> Result<(), Error> {
        let conf = ChanctxConf::new(DEFAULT_CHAN_DEF);
        for i in 0..NUM_PHY_CTX {
            let id = PhyCtxtId(i as u8);
            self.send_cmd(phy_ctxt_cmd(id, FwAction::Add, &conf))?;
            let ctxt = st.phy_ctxts.get_mut(id)?;
            ctxt.def = conf.def;
            ctxt.rx_chains_static = conf.rx_chains_static;
            ctxt.rx_chains_dynamic = conf.rx_chains_dynamic;
        }
        Ok(())
    }

    /// Reconfigures a context. A context shared by several interfaces may only change in ways
    /// all of them tolerate; moving it to another channel is refused.
    pub(crate) fn phy_ctxt_changed(
        &self,
        st: &mut MvmState,
        id: PhyCtxtId,
        conf: &ChanctxConf,
    ) -> Result<(), Error> {
        let ctxt = st.phy_ctxts.get(id)?;
        if ctxt.ref_count > 1 && ctxt.def.chan != conf.def.chan {
            return Err(Error::violation(format!(
                "PHY context {} is shared by {} interfaces, refusing channel change",
                id.0, ctxt.ref_count
            )));
        }
        debug!("PHY context {} -> {:?}", id.0, conf.def);
        self.send_cmd(phy_ctxt_cmd(id, FwAction::Modify, conf))?;
        let ctxt = st.phy_ctxts.get_mut(id)?;
        ctxt.def = conf.def;
        ctxt.rx_chains_static = conf.rx_chains_static;
        ctxt.rx_chains_dynamic = conf.rx_chains_dynamic;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            fw_api::CommandId,
            testutil::TestHelper,
            types::{ChanWidth, Channel},
        },
        assert_matches::assert_matches,
    };

    #[test]
    fn get_free_until_exhausted() {
        let mut pool = PhyContextPool::new();
        for _ in 0..NUM_PHY_CTX {
            let id = pool.get_free().expect("a free context should remain");
            pool.ref_ctxt(id).expect("ref should succeed");
        }
        assert_matches!(pool.get_free(), Err(Error::ResourceExhausted(_)));
        assert_eq!(pool.active_count(), NUM_PHY_CTX);

        pool.unref_ctxt(PhyCtxtId(1)).expect("unref should succeed");
        assert_eq!(pool.get_free().expect("context 1 is free again"), PhyCtxtId(1));
    }

    #[test]
    fn unref_unused_context_is_violation() {
        let mut pool = PhyContextPool::new();
        assert_matches!(pool.unref_ctxt(PhyCtxtId(0)), Err(Error::ProtocolViolation(_)));
        assert_eq!(pool.total_refs(), 0);
    }

    #[test]
    fn find_on_channel_skips_unreferenced() {
        let mut pool = PhyContextPool::new();
        assert_eq!(pool.find_on_channel(DEFAULT_CHAN_DEF.chan, None), None);
        pool.ref_ctxt(PhyCtxtId(2)).expect("ref should succeed");
        assert_eq!(pool.find_on_channel(DEFAULT_CHAN_DEF.chan, None), Some(PhyCtxtId(2)));
        assert_eq!(pool.find_on_channel(DEFAULT_CHAN_DEF.chan, Some(PhyCtxtId(2))), None);
    }

    #[test]
    fn start_uploads_every_context() {
        let h = TestHelper::started();
        let cmds = h.trans.drain_commands();
        let phy_adds: Vec<_> = cmds
            .iter()
            .filter_map(|cmd| match cmd {
                HostCommand::PhyContext(c) => Some(c.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(phy_adds.len(), NUM_PHY_CTX);
        for (i, cmd) in phy_adds.iter().enumerate() {
            assert_eq!(cmd.id, PhyCtxtId(i as u8));
            assert_eq!(cmd.action, FwAction::Add);
            assert_eq!(cmd.def, DEFAULT_CHAN_DEF);
        }
    }

    #[test]
    fn shared_context_refuses_channel_change() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        st.phy_ctxts.ref_ctxt(PhyCtxtId(0)).expect("ref should succeed");
        st.phy_ctxts.ref_ctxt(PhyCtxtId(0)).expect("ref should succeed");
        h.trans.clear();

        let conf = ChanctxConf::new(ChanDef::no_ht(Channel::new_5ghz(36)));
        assert_matches!(
            h.mvm.phy_ctxt_changed(&mut st, PhyCtxtId(0), &conf),
            Err(Error::ProtocolViolation(_))
        );
        assert_eq!(st.phy_ctxts.get(PhyCtxtId(0)).expect("valid id").def, DEFAULT_CHAN_DEF);
        assert!(h.trans.sent_ids().is_empty());

        let wider = ChanctxConf::new(ChanDef { width: ChanWidth::Ht40, ..DEFAULT_CHAN_DEF });
        h.mvm.phy_ctxt_changed(&mut st, PhyCtxtId(0), &wider).expect("width change is allowed");
        assert_eq!(h.trans.sent_ids(), vec![CommandId::PhyContext]);
        assert_eq!(st.phy_ctxts.get(PhyCtxtId(0)).expect("valid id").def.width, ChanWidth::Ht40);
    }

    #[test]
    fn rejected_modify_leaves_context_untouched() {
        let h = TestHelper::started();
        let mut st = h.mvm.state.lock();
        h.trans.reject(CommandId::PhyContext, 1);
        let conf = ChanctxConf::new(ChanDef::no_ht(Channel::new_2ghz(6)));
        assert_matches!(
            h.mvm.phy_ctxt_changed(&mut st, PhyCtxtId(1), &conf),
            Err(Error::FirmwareRejected { cmd: CommandId::PhyContext, status: 1 })
        );
        assert_eq!(st.phy_ctxts.get(PhyCtxtId(1)).expect("valid id").def, DEFAULT_CHAN_DEF);
    }
}
