//! TDesktop client implementation
//!
//! Entry point for reading and writing tdata folders.

use std::path::{Path, PathBuf};

use crate::account::Account;
use crate::crypto::AuthKey;
use crate::storage::{
    decrypt_key_data, get_absolute_path, read_key_data, read_mtp_data,
    write_account_map, write_key_data, write_mtp_data, KeyInfo, MtpData,
};
use crate::{Error, Result, DEFAULT_KEY_FILE, MAX_ACCOUNTS};

/// Telegram Desktop client representation
///
/// Represents a parsed tdata folder with all its accounts.
#[derive(Debug)]
pub struct TDesktop {
    /// Base path to the tdata folder
    base_path: PathBuf,
    /// Key file name (usually "data")
    key_file: String,
    /// Whether a passcode protects the folder
    has_passcode: bool,
    /// List of accounts
    accounts: Vec<Account>,
    /// App version from tdata
    app_version: u32,
}

impl TDesktop {
    /// Load TDesktop from a specific path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(path, None, None)
    }

    /// Load TDesktop protected with a Local Passcode
    pub fn from_path_with_passcode<P: AsRef<Path>>(path: P, passcode: &str) -> Result<Self> {
        Self::with_options(path, Some(passcode), None)
    }

    /// Load TDesktop with all options
    ///
    /// # Arguments
    /// - `path`: Path to the tdata folder
    /// - `passcode`: Optional Local Passcode
    /// - `key_file`: Optional key file name (default: "data")
    pub fn with_options<P: AsRef<Path>>(
        path: P,
        passcode: Option<&str>,
        key_file: Option<&str>,
    ) -> Result<Self> {
        let base_path = get_absolute_path(path.as_ref());

        if !base_path.exists() {
            return Err(Error::FolderNotFound { path: base_path });
        }

        let key_file = key_file.unwrap_or(DEFAULT_KEY_FILE).to_string();
        let passcode = passcode.unwrap_or("");

        let key_data = read_key_data(&base_path, &key_file)?;

        let KeyInfo {
            local_key,
            account_indices,
        } = decrypt_key_data(&key_data, passcode.as_bytes())?;

        tracing::info!("Loaded key data: {} accounts found", account_indices.len());

        let mut accounts = Vec::new();
        for index in account_indices {
            match Self::load_account(&base_path, index, &local_key, &key_file) {
                Ok(account) => {
                    tracing::info!(
                        "Loaded account {}: dc_id={}, user_id={}",
                        index,
                        account.dc_id(),
                        account.user_id()
                    );
                    accounts.push(account);
                }
                Err(e) => {
                    tracing::warn!("Failed to load account {}: {}", index, e);
                }
            }
        }

        if accounts.is_empty() {
            return Err(Error::NoAccounts);
        }

        Ok(Self {
            base_path,
            key_file,
            has_passcode: !passcode.is_empty(),
            accounts,
            app_version: key_data.version,
        })
    }

    /// Write a new tdata folder holding `accounts`
    ///
    /// A fresh local key is generated. Account slots are renumbered 0..n in
    /// the given order. Existing key and account files in `path` are replaced.
    pub fn create<P: AsRef<Path>>(
        path: P,
        accounts: Vec<Account>,
        passcode: Option<&str>,
        key_file: Option<&str>,
    ) -> Result<Self> {
        if accounts.is_empty() {
            return Err(Error::NoAccounts);
        }
        if accounts.len() > MAX_ACCOUNTS {
            return Err(Error::TooManyAccounts {
                count: accounts.len(),
                max: MAX_ACCOUNTS,
            });
        }

        let base_path = get_absolute_path(path.as_ref());
        let key_file = key_file.unwrap_or(DEFAULT_KEY_FILE).to_string();
        let passcode = passcode.unwrap_or("");
        let local_key = AuthKey::generate();

        std::fs::create_dir_all(&base_path)?;

        let accounts: Vec<Account> = accounts
            .into_iter()
            .enumerate()
            .map(|(slot, account)| {
                Account::new(
                    slot as i32,
                    account.dc_id(),
                    account.user_id(),
                    *account.auth_key_bytes(),
                )
            })
            .collect();

        for account in &accounts {
            let mtp = MtpData {
                dc_id: account.dc_id(),
                user_id: account.user_id(),
                auth_key: *account.auth_key_bytes(),
            };
            write_mtp_data(&base_path, account.index(), &local_key, &key_file, &mtp)?;
            write_account_map(&base_path, account.index(), &local_key, &key_file)?;
        }

        let indices: Vec<i32> = accounts.iter().map(Account::index).collect();
        write_key_data(
            &base_path,
            &key_file,
            passcode.as_bytes(),
            &local_key,
            &indices,
        )?;

        tracing::info!(
            "Wrote tdata with {} account(s) to {:?}",
            accounts.len(),
            base_path
        );

        Ok(Self {
            base_path,
            key_file,
            has_passcode: !passcode.is_empty(),
            accounts,
            app_version: crate::storage::WRITE_APP_VERSION,
        })
    }

    /// Load a single account
    fn load_account(
        base_path: &Path,
        index: i32,
        local_key: &AuthKey,
        key_file: &str,
    ) -> Result<Account> {
        let mtp_data = read_mtp_data(base_path, index, local_key, key_file)?;

        Ok(Account::new(
            index,
            mtp_data.dc_id,
            mtp_data.user_id,
            mtp_data.auth_key,
        ))
    }

    /// Get the base path to the tdata folder
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get all accounts
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Get the main (first) account
    pub fn main_account(&self) -> Option<&Account> {
        self.accounts.first()
    }

    /// Get the app version
    pub fn app_version(&self) -> u32 {
        self.app_version
    }

    /// Check if the tdata has a passcode
    pub fn has_passcode(&self) -> bool {
        self.has_passcode
    }

    /// Get the key file name
    pub fn key_file(&self) -> &str {
        &self.key_file
    }
}
