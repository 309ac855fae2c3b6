// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line bring-up tool for the RTD2142 firmware-update core.
//!
//! Talks to a real `/dev/i2c-N` device; useful for bench testing against
//! actual hardware outside of the host daemon this crate is normally
//! embedded in.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use drv_rtd2142_mst::quirks::DP_AUX_NAME_KEY;
use drv_rtd2142_mst::resolver::BusResolver;
use drv_rtd2142_mst::{probe, DeviceFlags, Quirks, Session};

#[derive(Parser)]
#[clap(about = "Bring-up tool for the RTD2142 MST hub firmware core")]
struct Cli {
    /// Path to a TOML config file naming the DP-AUX device and its bus.
    #[clap(short, long, default_value = "mst-tool.toml")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the device and print its version/flags.
    Status,
    /// Write a firmware image to the inactive bank.
    Update {
        /// Path to the raw firmware blob (must be exactly 0x70000 bytes).
        firmware: PathBuf,
    },
}

/// On-disk config: mirrors the quirk key-value table the host daemon
/// would normally supply, plus the literal bus path a real daemon would
/// have resolved via udev.
#[derive(Deserialize)]
struct Config {
    #[serde(rename = "RealtekMstDpAuxName")]
    dp_aux_name: String,
    i2c_bus_path: PathBuf,
}

struct ConfiguredResolver {
    path: PathBuf,
}

impl BusResolver for ConfiguredResolver {
    fn resolve(
        &self,
        _dp_aux_name: &str,
    ) -> drv_rtd2142_mst::Result<PathBuf> {
        Ok(self.path.clone())
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let mut quirks = BTreeMap::new();
    quirks.insert(DP_AUX_NAME_KEY.to_string(), config.dp_aux_name.clone());
    let quirks = Quirks::new(quirks);
    let resolver = ConfiguredResolver {
        path: config.i2c_bus_path,
    };

    let probed = probe(&quirks, &resolver).context("probe failed")?;
    let mut session = Session::open(probed).context("opening i2c bus")?;
    session.setup().context("version probe failed")?;

    match cli.command {
        Command::Status => print_status(&session),
        Command::Update { firmware } => run_update(&mut session, &firmware)?,
    }

    Ok(())
}

fn print_status(session: &Session<drv_rtd2142_mst::transport::LinuxI2cBus>) {
    println!("dp_aux_name: {}", session.dp_aux_name());
    println!("active_bank: {:?}", session.active_bank());
    println!("version: {}", session.version().unwrap_or("unknown"));
    println!("updatable: {}", session.flags().contains(DeviceFlags::UPDATABLE));
}

fn run_update(
    session: &mut Session<drv_rtd2142_mst::transport::LinuxI2cBus>,
    firmware: &Path,
) -> Result<()> {
    let blob = fs::read(firmware)
        .with_context(|| format!("reading firmware {}", firmware.display()))?;

    log::info!("detaching device for programming");
    session.detach(&mut ()).context("detach failed")?;

    let result = session.write_firmware(&blob, &mut ());

    log::info!("attaching device back to normal operation");
    session.attach(&mut ()).context("attach failed")?;
    session.reload().context("post-attach version probe failed")?;

    result.context("write_firmware failed")?;
    println!("update complete; version now {}", session.version().unwrap_or("unknown"));
    Ok(())
}
