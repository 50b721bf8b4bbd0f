// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/plaudit/plaudit.toml`
//! 3. `~/.config/plaudit/plaudit.toml`
//! 4. `./plaudit.toml`
//! 5. `PLAUDIT_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::PlauditConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/plaudit/plaudit.toml";
pub(crate) const LOCAL_CONFIG: &str = "plaudit.toml";

/// Top-level sections an env var may address, e.g. `PLAUDIT_DISPATCH_MAX_RETRIES`.
const SECTIONS: &[&str] = &[
    "service",
    "storage",
    "gateway",
    "dispatch",
    "webhook",
    "redirect",
    "usage",
    "email",
    "sms",
    "prometheus",
];

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("plaudit/plaudit.toml"))
}

/// Build the full layered Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(PlauditConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

pub fn load_config() -> Result<PlauditConfig, figment::Error> {
    build_figment().extract()
}

/// Load from one TOML string over the defaults. No files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<PlauditConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PlauditConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load from one explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<PlauditConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PlauditConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Env vars map `section_key` to `section.key` on the first underscore after
/// a known section name, so `PLAUDIT_EMAIL_FROM_ADDRESS` becomes
/// `email.from_address` rather than `email.from.address`.
fn env_provider() -> Env {
    Env::prefixed("PLAUDIT_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key
}
