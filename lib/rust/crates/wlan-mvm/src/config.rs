// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::error::Error,
    serde::{Deserialize, Serialize},
    std::{fs::File, io::BufReader, path::Path, time::Duration},
};

/// Firmware capabilities and driver knobs. Every field has a default so a partial JSON document
/// is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MvmConfig {
    /// Runtime low-power (D0i3) support. Reference counting is a no-op without it.
    pub d0i3_supported: bool,
    /// Upper bound on waiting for a low-power exit in `acquire_sync`.
    pub ref_sync_timeout_ms: u64,
    /// Upper bound on waiting for a firmware notification after a command.
    pub cmd_timeout_ms: u64,
    /// Firmware supports the aux (hotspot) remain-on-channel command.
    pub hotspot_supported: bool,
    /// Firmware uses the unified LMAC scan API.
    pub lmac_scan_api: bool,
    pub n_scan_channels: usize,
    /// SKU supports 802.11n; aggregation is refused without it.
    pub ht_enabled: bool,
    pub rx_agg_enabled: bool,
    pub tx_agg_enabled: bool,
    pub max_rx_ba_sessions: u32,
    /// Keys are handled in software; hardware key installation is refused.
    pub sw_crypto: bool,
    /// Ask firmware to pass all multicast frames regardless of the address list.
    pub mcast_pass_all: bool,
    pub power_save_enabled: bool,
}

impl Default for MvmConfig {
    fn default() -> Self {
        Self {
            d0i3_supported: true,
            ref_sync_timeout_ms: 1000,
            cmd_timeout_ms: 1000,
            hotspot_supported: true,
            lmac_scan_api: false,
            n_scan_channels: 40,
            ht_enabled: true,
            rx_agg_enabled: true,
            tx_agg_enabled: true,
            max_rx_ba_sessions: 16,
            sw_crypto: false,
            mcast_pass_all: false,
            power_save_enabled: true,
        }
    }
}

impl MvmConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn ref_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.ref_sync_timeout_ms)
    }

    pub fn cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.cmd_timeout_ms)
    }
}
