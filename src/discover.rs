//! Candidate discovery

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::Config;
use crate::convert::Direction;
use crate::detect::{detect, is_tdata_dir, SessionKind};
use crate::Result;

/// Something found on disk that a direction will try to convert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Path as found during the scan (used for names and sidecars)
    pub source: PathBuf,
    /// Path to open (differs from `source` for Telegram Desktop install folders)
    pub path: PathBuf,
    pub kind: SessionKind,
}

/// A found item that does not fit the chosen direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub source: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub candidates: Vec<Candidate>,
    pub skipped: Vec<Skipped>,
}

/// All `*.session` files under `dir`, recursively, sorted
pub fn find_session_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !dir.is_dir() {
        tracing::warn!("Folder {:?} not found", dir);
        return Ok(found);
    }
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "session")
        {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

/// All tdata folders under `dir` (including `dir` itself), sorted
///
/// Detected folders are not descended into.
pub fn find_tdata_folders(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !dir.is_dir() {
        tracing::warn!("Folder {:?} not found", dir);
        return Ok(found);
    }
    if is_tdata_dir(dir) {
        found.push(dir.to_path_buf());
        return Ok(found);
    }

    let mut entries = WalkDir::new(dir).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = entries.next() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_dir() && is_tdata_dir(entry.path()) {
            found.push(entry.into_path());
            entries.skip_current_dir();
        }
    }
    found.sort();
    Ok(found)
}

/// The installed Telegram Desktop's tdata, when `direction` reads tdata
///
/// `install` is the per-OS default location, see [`crate::get_default_tdata_path`].
pub fn desktop_candidate(direction: Direction, install: Option<&Path>) -> Option<Candidate> {
    if !matches!(direction.source(), None | Some(SessionKind::TData)) {
        return None;
    }
    let Some(path) = install.filter(|p| is_tdata_dir(p)) else {
        tracing::warn!("Telegram Desktop tdata not found");
        return None;
    };
    Some(Candidate {
        source: path.to_path_buf(),
        path: path.to_path_buf(),
        kind: SessionKind::TData,
    })
}

/// Find the sources for `direction`
pub fn candidates(config: &Config, direction: Direction) -> Result<Discovery> {
    let mut discovery = Discovery::default();
    let wanted = direction.source();

    let wants_sessions = matches!(
        wanted,
        None | Some(SessionKind::Telethon) | Some(SessionKind::Pyrogram)
    );
    let wants_tdata = matches!(wanted, None | Some(SessionKind::TData));

    let mut sources = Vec::new();
    if wants_sessions {
        sources.extend(find_session_files(&config.sessions_dir)?);
    }
    if wants_tdata {
        sources.extend(find_tdata_folders(&config.tdatas_dir)?);
    }

    for source in sources {
        let detected = match detect(&source) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Could not inspect {:?}: {}", source, e);
                discovery.skipped.push(Skipped {
                    source,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match detected {
            Some(d) if wanted.is_none() || wanted == Some(d.kind) => {
                discovery.candidates.push(Candidate {
                    source,
                    path: d.path,
                    kind: d.kind,
                });
            }
            Some(d) => {
                tracing::warn!("Skipping {:?}: {} session, expected {}", source, d.kind, direction);
                discovery.skipped.push(Skipped {
                    source,
                    reason: format!("{} session does not match {}", d.kind, direction),
                });
            }
            None => {
                tracing::warn!("Skipping {:?}: unrecognized format", source);
                discovery.skipped.push(Skipped {
                    source,
                    reason: "unrecognized session format".to_string(),
                });
            }
        }
    }

    Ok(discovery)
}
