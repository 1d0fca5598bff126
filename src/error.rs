//! Error types for tdconvert

use std::path::PathBuf;

/// Result type alias for tdconvert operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading, writing or converting sessions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error while reading or writing session files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error from a Telethon or Pyrogram session database
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON error (sidecar metadata or results log)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The tdata folder path does not exist
    #[error("tdata folder not found: {path}")]
    FolderNotFound { path: PathBuf },

    /// Required file is missing from tdata folder
    #[error("required file not found: {file} in {folder}")]
    FileNotFound { file: String, folder: PathBuf },

    /// Failed to decrypt tdata - wrong passcode or corrupted data
    #[error("decryption failed: wrong passcode or corrupted data")]
    DecryptionFailed,

    /// The tdata folder is password-protected but no passcode provided
    #[error("tdata is password-protected, passcode required")]
    PasscodeRequired,

    /// QDataStream parsing error
    #[error("QDataStream parse error: {message}")]
    QDataStreamError { message: String },

    /// Unexpected end of data while parsing
    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEof { offset: u64 },

    /// Invalid data format or structure
    #[error("invalid data format: {message}")]
    InvalidFormat { message: String },

    /// No accounts found in tdata
    #[error("no accounts found in tdata")]
    NoAccounts,

    /// Too many accounts for a single tdata folder
    #[error("too many accounts: {count} (max: {max})")]
    TooManyAccounts { count: usize, max: usize },

    /// MD5 checksum mismatch in encrypted data
    #[error("checksum mismatch: data may be corrupted")]
    ChecksumMismatch,

    /// Auth key extraction failed
    #[error("failed to extract auth key: {reason}")]
    AuthKeyExtractionFailed { reason: String },

    /// The session holds no auth key, or Telegram rejected it
    #[error("session is not authorized: {path}")]
    NotAuthorized { path: PathBuf },

    /// The target format needs a user id that neither the source nor its sidecar provides
    #[error("user id unknown for {path} (add a {sidecar} file with \"user_id\")")]
    UnknownUserId { path: PathBuf, sidecar: String },

    /// Source and target formats are the same
    #[error("nothing to convert: source and target are both {kind}")]
    SameFormat { kind: String },

    /// Connecting to Telegram or querying the account failed
    #[error("network error: {message}")]
    Network { message: String },

    /// A background conversion task died before returning
    #[error("conversion task failed: {message}")]
    TaskFailed { message: String },
}

impl Error {
    /// Create a QDataStream error with a message
    pub fn qdatastream(msg: impl Into<String>) -> Self {
        Self::QDataStreamError {
            message: msg.into(),
        }
    }

    /// Create an invalid format error with a message
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: msg.into(),
        }
    }

    /// Create a network error with a message
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
        }
    }

    /// Create an auth key extraction error
    pub fn auth_key_failed(reason: impl Into<String>) -> Self {
        Self::AuthKeyExtractionFailed {
            reason: reason.into(),
        }
    }
}
