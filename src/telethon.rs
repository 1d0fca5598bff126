//! Telethon SQLite sessions
//!
//! Telethon keeps one row per datacenter in `sessions`; the row holding an
//! auth key is the account's home DC. It does not record the user id.

use std::fs;
use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::profile::AccountProfile;
use crate::session::SessionData;
use crate::{Error, Result, AUTH_KEY_SIZE};

/// Schema version written by current Telethon releases
pub const SCHEMA_VERSION: i64 = 7;

const SCHEMA: &str = "
    CREATE TABLE version (version integer primary key);
    CREATE TABLE sessions (
        dc_id integer primary key,
        server_address text,
        port integer,
        auth_key blob,
        takeout_id integer
    );
    CREATE TABLE entities (
        id integer primary key,
        hash integer not null,
        username text,
        phone integer,
        name text,
        date integer
    );
    CREATE TABLE sent_files (
        md5_digest blob,
        file_size integer,
        type integer,
        id integer,
        hash integer,
        primary key(md5_digest, file_size, type)
    );
    CREATE TABLE update_state (
        id integer primary key,
        pts integer,
        qts integer,
        date integer,
        seq integer
    );
";

pub(crate) fn open_read_only(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Read the authorized DC and its key from a Telethon session
pub fn read<P: AsRef<Path>>(path: P) -> Result<SessionData> {
    let path = path.as_ref();
    let conn = open_read_only(path)?;

    let mut stmt = conn.prepare(
        "SELECT dc_id, server_address, port, auth_key FROM sessions \
         WHERE auth_key IS NOT NULL ORDER BY dc_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i32>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<i64>>(2)?,
            row.get::<_, Vec<u8>>(3)?,
        ))
    })?;

    for row in rows {
        let (dc_id, server_address, port, auth_key) = row?;
        if auth_key.len() != AUTH_KEY_SIZE {
            tracing::debug!(
                "Skipping DC {} in {:?}: auth key is {} bytes",
                dc_id,
                path,
                auth_key.len()
            );
            continue;
        }

        let mut session = SessionData::from_key_blob(dc_id, &auth_key)?;
        if let Some(address) = server_address.filter(|a| !a.is_empty()) {
            session.server_address = address;
        }
        if let Some(port) = port.and_then(|p| u16::try_from(p).ok()) {
            session.port = port;
        }

        tracing::debug!("Telethon session {:?}: {:?}", path, session);
        return Ok(session);
    }

    Err(Error::NotAuthorized {
        path: path.to_path_buf(),
    })
}

/// Write `session` as a fresh Telethon session, replacing any file at `path`
pub fn write<P: AsRef<Path>>(path: P, session: &SessionData) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        fs::remove_file(path)?;
    }

    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;
    tx.execute("INSERT INTO version VALUES (?1)", params![SCHEMA_VERSION])?;
    tx.execute(
        "INSERT INTO sessions (dc_id, server_address, port, auth_key, takeout_id) \
         VALUES (?1, ?2, ?3, ?4, NULL)",
        params![
            session.dc_id,
            session.server_address,
            session.port,
            &session.auth_key[..]
        ],
    )?;
    tx.commit()?;

    tracing::info!("Wrote Telethon session {:?} (dc {})", path, session.dc_id);
    Ok(())
}

/// Number of cached entities (users, chats, channels)
pub fn peer_count<P: AsRef<Path>>(path: P) -> Result<usize> {
    let conn = open_read_only(path.as_ref())?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// Profile of `user_id` from the entity cache, if Telethon stored it
pub fn self_profile<P: AsRef<Path>>(path: P, user_id: i64) -> Result<Option<AccountProfile>> {
    let conn = open_read_only(path.as_ref())?;
    let profile = conn
        .query_row(
            "SELECT username, phone, name FROM entities WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(AccountProfile {
                    user_id: Some(user_id),
                    username: row.get::<_, Option<String>>(0)?,
                    phone: row.get::<_, Option<i64>>(1)?.map(|p| p.to_string()),
                    first_name: row.get::<_, Option<String>>(2)?,
                    last_name: None,
                })
            },
        )
        .optional()?;
    Ok(profile)
}
