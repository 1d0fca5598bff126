//! Runtime configuration

use std::path::PathBuf;

use crate::{DEFAULT_API_ID, DEFAULT_KEY_FILE};

/// Settings shared by discovery, conversion and reporting
#[derive(Debug, Clone)]
pub struct Config {
    /// Where Telethon/Pyrogram `.session` files are looked for
    pub sessions_dir: PathBuf,
    /// Where tdata folders are looked for and written
    pub tdatas_dir: PathBuf,
    /// Root for converted `.session` files (`<output_dir>/<format>/`)
    pub output_dir: PathBuf,
    /// JSON results log
    pub results_file: PathBuf,
    /// Local Passcode for reading and writing tdata
    pub passcode: Option<String>,
    /// tdata key file name
    pub key_file: String,
    /// API id for Pyrogram sessions whose source carries none
    pub api_id: i32,
    /// Conversions allowed to run at once
    pub jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("sessions"),
            tdatas_dir: PathBuf::from("tdatas"),
            output_dir: PathBuf::from("converted"),
            results_file: PathBuf::from("conversion_results.json"),
            passcode: None,
            key_file: DEFAULT_KEY_FILE.to_string(),
            api_id: DEFAULT_API_ID,
            jobs: 1,
        }
    }
}

impl Config {
    /// Config rooted at `base`, used by tests and embedding callers
    pub fn rooted_at(base: &std::path::Path) -> Self {
        let defaults = Self::default();
        Self {
            sessions_dir: base.join(&defaults.sessions_dir),
            tdatas_dir: base.join(&defaults.tdatas_dir),
            output_dir: base.join(&defaults.output_dir),
            results_file: base.join(&defaults.results_file),
            ..defaults
        }
    }

    pub fn passcode(&self) -> Option<&str> {
        self.passcode.as_deref().filter(|p| !p.is_empty())
    }
}
