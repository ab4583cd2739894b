// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;

/// Mirrors `drv_r2p::store::ACTION_LEN`.
const ACTION_LEN: usize = 16;
/// Mirrors `r2p_handoff::ID_LEN`.
const ENTRY_ID_LEN: usize = 8;

const ACTIONS: &[&str] =
    &["self", "via-payload", "bootloader", "ums", "normal"];

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
enum TailFill {
    Zero,
    Stale,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TaskConfig {
    #[serde(default)]
    action: String,
    #[serde(default)]
    entry_id: String,
    #[serde(default)]
    param1: i32,
    #[serde(default)]
    param2: i32,
    #[serde(default = "default_encode_nop")]
    encode_nop_on_new_hardware: bool,
    #[serde(default = "default_tail_fill")]
    tail_fill: TailFill,
}

fn default_encode_nop() -> bool {
    true
}

fn default_tail_fill() -> TailFill {
    TailFill::Zero
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            action: String::new(),
            entry_id: String::new(),
            param1: 0,
            param2: 0,
            encode_nop_on_new_hardware: default_encode_nop(),
            tail_fill: default_tail_fill(),
        }
    }
}

fn task_config_or_default() -> Result<TaskConfig> {
    println!("cargo:rerun-if-env-changed=HUBRIS_TASK_CONFIG");
    match std::env::var("HUBRIS_TASK_CONFIG") {
        Ok(text) => {
            toml::from_str(&text).context("parsing HUBRIS_TASK_CONFIG")
        }
        Err(std::env::VarError::NotPresent) => Ok(TaskConfig::default()),
        Err(e) => Err(e.into()),
    }
}

fn check(config: &TaskConfig) -> Result<()> {
    if !config.action.is_empty() && !ACTIONS.contains(&config.action.as_str())
    {
        bail!(
            "unknown action {:?}; expected one of {ACTIONS:?}",
            config.action
        );
    }
    if config.action.len() >= ACTION_LEN {
        bail!("action must be shorter than {ACTION_LEN} bytes");
    }
    if config.entry_id.len() >= ENTRY_ID_LEN {
        bail!("entry-id must be shorter than {ENTRY_ID_LEN} bytes");
    }
    if config.entry_id.contains('\0') {
        bail!("entry-id must not contain NUL");
    }
    Ok(())
}

fn main() -> Result<()> {
    let config = task_config_or_default()?;
    check(&config)?;

    let out = PathBuf::from(std::env::var("OUT_DIR")?).join("r2p_config.rs");
    let mut file = std::fs::File::create(&out)?;

    writeln!(file, "/// Boot parameters from the task configuration.")?;
    writeln!(
        file,
        "pub const BOOT_PARAMS: BootParams<'static> = BootParams {{ \
         action: {:?}, entry_id: {:?}, param1: {}, param2: {} }};",
        config.action, config.entry_id, config.param1, config.param2,
    )?;
    writeln!(file, "/// Board policy from the task configuration.")?;
    writeln!(
        file,
        "pub const POLICY: Policy = Policy {{ \
         encode_nop_on_new_hardware: {}, tail_fill: TailFill::{} }};",
        config.encode_nop_on_new_hardware,
        match config.tail_fill {
            TailFill::Zero => "Zero",
            TailFill::Stale => "Stale",
        },
    )?;

    Ok(())
}
