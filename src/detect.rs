//! Session format sniffing
//!
//! SQLite sessions are told apart by the columns of their `sessions` table;
//! tdata folders by their key file.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pyrogram::table_columns;
use crate::telethon::open_read_only;
use crate::Result;

/// Header of every SQLite 3 database file
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Key file names that mark a tdata folder
const TDATA_MARKERS: [&str; 2] = ["key_datas", "key_data"];

/// On-disk session formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Telethon,
    Pyrogram,
    #[serde(rename = "tdata")]
    TData,
}

impl SessionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Telethon => "Telethon",
            Self::Pyrogram => "Pyrogram",
            Self::TData => "TData",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A detected session on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    pub kind: SessionKind,
    /// Path to open: for a Telegram Desktop install folder this is its `tdata` child
    pub path: PathBuf,
}

/// True when `dir` holds a tdata key file
pub fn is_tdata_dir(dir: &Path) -> bool {
    dir.is_dir() && TDATA_MARKERS.iter().any(|m| dir.join(m).is_file())
}

/// Detect the format of `path`
///
/// Returns `Ok(None)` for anything that is not a recognizable session.
pub fn detect(path: &Path) -> Result<Option<Detected>> {
    if path.is_dir() {
        return Ok(detect_dir(path));
    }
    if !path.is_file() || !has_sqlite_header(path)? {
        return Ok(None);
    }

    let kind = sqlite_kind(path)?;
    Ok(kind.map(|kind| Detected {
        kind,
        path: path.to_path_buf(),
    }))
}

fn detect_dir(path: &Path) -> Option<Detected> {
    if is_tdata_dir(path) {
        return Some(Detected {
            kind: SessionKind::TData,
            path: path.to_path_buf(),
        });
    }

    // Telegram Desktop install folder
    let child = path.join("tdata");
    is_tdata_dir(&child).then_some(Detected {
        kind: SessionKind::TData,
        path: child,
    })
}

fn has_sqlite_header(path: &Path) -> Result<bool> {
    let mut header = [0u8; 16];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == SQLITE_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn sqlite_kind(path: &Path) -> Result<Option<SessionKind>> {
    let conn = open_read_only(path)?;
    let columns = table_columns(&conn, "sessions")?;
    tracing::debug!("{:?}: sessions columns {:?}", path, columns);

    let has = |name: &str| columns.iter().any(|c| c == name);

    if has("server_address") {
        Ok(Some(SessionKind::Telethon))
    } else if has("user_id") || has("is_bot") || has("api_id") {
        Ok(Some(SessionKind::Pyrogram))
    } else {
        Ok(None)
    }
}
