use serde::Deserialize;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use backtrace::Backtrace;
use log::error;

use crate::config::MailServerConfig;
use crate::credentials::CredentialStore;

// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub mail: MailServerConfig,
    pub account: AccountSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccountSettings {
    pub user_name: String,
    #[serde(default = "default_attach_path")]
    pub save_attach_path: String,
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
    #[serde(default = "default_password_file")]
    pub password_file: PathBuf,
}

fn default_attach_path() -> String {
    "attachments".to_string()
}

fn default_key_file() -> PathBuf {
    PathBuf::from(".encryption_key")
}

fn default_password_file() -> PathBuf {
    PathBuf::from(".encrypted_password")
}

impl AccountSettings {
    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(&self.key_file, &self.password_file)
    }
}

fn log_failure(err: &dyn std::fmt::Display) {
    error!("Error: {}", err);

    // Capture and print the backtrace
    let backtrace = Backtrace::new();
    error!("Backtrace:\n{:?}", backtrace);
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    // Open the YAML file
    let file = File::open(path).map_err(|err| {
        log_failure(&err);
        err
    });
    let file = file.with_context(|| format!("Cannot find settings at {}", path.display()))?;

    let reader = BufReader::new(file);

    // Parse the YAML file into the Settings struct
    let settings: Result<Settings, serde_yaml::Error> = serde_yaml::from_reader(reader);
    let settings = settings.map_err(|err| {
        log_failure(&err);
        err
    });
    settings.with_context(|| format!("Cannot deserialize settings from {}", path.display()))
}
