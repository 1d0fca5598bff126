//! # tdconvert
//!
//! Conversion of Telegram account sessions between three on-disk formats:
//!
//! - Telethon SQLite sessions (`*.session`)
//! - Pyrogram SQLite sessions (`*.session`)
//! - Telegram Desktop `tdata` folders
//!
//! ## Features
//!
//! - Read and write `tdata` folders, including password-protected ones (Local Passcode)
//! - Read and write Telethon and Pyrogram session databases
//! - Sniff the format of a file or folder from its SQLite schema or directory markers
//! - Optional online lookup of each account's profile, dialogs and contacts
//! - Batch conversion with per-item results and a JSON log
//!
//! ## Example
//!
//! ```rust,no_run
//! use tdconvert::{telethon, TDesktop};
//!
//! fn main() -> Result<(), tdconvert::Error> {
//!     let tdesktop = TDesktop::from_path("/path/to/tdata")?;
//!
//!     if let Some(account) = tdesktop.main_account() {
//!         let session = account.to_session_data();
//!         telethon::write("account.session", &session)?;
//!         println!("DC ID: {}", account.dc_id());
//!         println!("User ID: {}", account.user_id());
//!     }
//!
//!     Ok(())
//! }
//! ```

mod error;
mod qdatastream;
mod crypto;
mod storage;
mod account;
mod tdesktop;

pub mod config;
pub mod convert;
pub mod dc;
pub mod detect;
pub mod discover;
pub mod online;
pub mod profile;
pub mod pyrogram;
pub mod report;
pub mod session;
pub mod telethon;

pub use account::Account;
pub use config::Config;
pub use convert::{Converter, Direction, Reporter};
pub use detect::SessionKind;
pub use error::{Error, Result};
pub use report::{ConversionResult, Status};
pub use session::SessionData;
pub use storage::get_default_tdata_path;
pub use tdesktop::TDesktop;

/// Auth key size in bytes (256 bytes = 2048 bits)
pub const AUTH_KEY_SIZE: usize = 256;

/// Default key file name
pub const DEFAULT_KEY_FILE: &str = "data";

/// Maximum number of accounts supported by Telegram Desktop
pub const MAX_ACCOUNTS: usize = 3;

/// Telegram Desktop API id, used for Pyrogram sessions that carry none
pub const DEFAULT_API_ID: i32 = 2040;
