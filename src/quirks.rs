// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Quirk key-value configuration, as consumed from the host daemon.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// The only quirk key this core understands.
pub const DP_AUX_NAME_KEY: &str = "RealtekMstDpAuxName";

/// A key-value quirk table supplied by the host. This core recognizes
/// exactly one key; any other key is `NotSupported`.
#[derive(Debug, Default, Clone)]
pub struct Quirks(BTreeMap<String, String>);

impl Quirks {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self(entries)
    }

    /// Returns the configured DP-AUX device name, required for `probe`.
    pub fn dp_aux_name(&self) -> Result<&str> {
        self.0
            .get(DP_AUX_NAME_KEY)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::NotSupported(format!("missing quirk {DP_AUX_NAME_KEY}"))
            })
    }

    /// Validates that every key in the table is recognized.
    pub fn validate(&self) -> Result<()> {
        for key in self.0.keys() {
            if key != DP_AUX_NAME_KEY {
                return Err(Error::NotSupported(format!(
                    "unknown quirk key {key}"
                )));
            }
        }
        Ok(())
    }
}
