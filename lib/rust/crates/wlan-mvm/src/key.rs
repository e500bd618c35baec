// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        error::Error,
        fw_api::{AddKeyCmd, HostCommand},
        mvm::{Mvm, MvmState},
        types::{KeyConf, MacAddr, StaId, VifId},
    },
    log::{debug, error},
};

/// Hardware key offsets available in firmware.
pub const STA_KEY_MAX_NUM: u8 = 16;

fn alloc_key_offset(table: &mut u16) -> Option<u8> {
    let offset = (!*table).trailing_zeros() as u8;
    if offset >= STA_KEY_MAX_NUM {
        return None;
    }
    *table |= 1 << offset;
    Some(offset)
}

impl Mvm {
    /// Station the key belongs to: the given peer, or the AP station for group keys.
    fn key_sta_id(
        &self,
        st: &MvmState,
        vif_id: VifId,
        sta: Option<&MacAddr>,
    ) -> Result<Option<StaId>, Error> {
        match sta {
            Some(addr) => Ok(self.stations.find(vif_id, addr).map(|sta| sta.sta_id)),
            None => Ok(st.vif(vif_id)?.ap_sta_id),
        }
    }

    pub(crate) fn set_sta_key(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        sta: Option<&MacAddr>,
        key: &mut KeyConf,
    ) -> Result<(), Error> {
        let sta_id = self
            .key_sta_id(st, vif_id, sta)?
            .ok_or(Error::InvalidArgument("no station for key"))?;
        let offset = alloc_key_offset(&mut st.fw_key_table)
            .ok_or(Error::ResourceExhausted("hardware key offset"))?;
        let cmd = AddKeyCmd {
            sta_id,
            key_offset: offset,
            keyidx: key.keyidx,
            cipher: key.cipher,
            key: key.key.clone(),
        };
        if let Err(e) = self.send_cmd(HostCommand::AddKey(cmd)) {
            st.fw_key_table &= !(1 << offset);
            return Err(e);
        }
        debug!("key {} of station {} at offset {}", key.keyidx, sta_id.0, offset);
        key.hw_key_idx = Some(offset);
        Ok(())
    }

    pub(crate) fn remove_sta_key(
        &self,
        st: &mut MvmState,
        vif_id: VifId,
        sta: Option<&MacAddr>,
        key: &mut KeyConf,
    ) -> Result<(), Error> {
        let offset = match key.hw_key_idx.take() {
            Some(offset) => offset,
            None => return Ok(()),
        };
        if st.fw_key_table & (1 << offset) == 0 {
            error!("key offset {} was not in use", offset);
        }
        st.fw_key_table &= !(1 << offset);
        let sta_id = match self.key_sta_id(st, vif_id, sta)? {
            Some(sta_id) => sta_id,
            // The key went away with its station.
            None => return Ok(()),
        };
        self.send_cmd(HostCommand::RemoveKey { sta_id, key_offset: offset, keyidx: key.keyidx })?;
        Ok(())
    }
}
