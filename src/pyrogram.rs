//! Pyrogram SQLite sessions
//!
//! Pyrogram stores a single `sessions` row that, unlike Telethon, carries the
//! user id. Schema 2 lacks the `api_id` column; schema 3 and later have it.

use std::fs;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::profile::AccountProfile;
use crate::session::SessionData;
use crate::telethon::open_read_only;
use crate::{Error, Result, AUTH_KEY_SIZE};

/// Schema version written by this module
pub const SCHEMA_VERSION: i64 = 3;

const SCHEMA: &str = "
    CREATE TABLE sessions (
        dc_id     INTEGER PRIMARY KEY,
        api_id    INTEGER,
        test_mode INTEGER,
        auth_key  BLOB,
        date      INTEGER NOT NULL,
        user_id   INTEGER,
        is_bot    INTEGER
    );
    CREATE TABLE peers (
        id             INTEGER PRIMARY KEY,
        access_hash    INTEGER,
        type           INTEGER NOT NULL,
        username       TEXT,
        phone_number   TEXT,
        last_update_on INTEGER NOT NULL DEFAULT (CAST(STRFTIME('%s', 'now') AS INTEGER))
    );
    CREATE TABLE version (
        number INTEGER PRIMARY KEY
    );
    CREATE INDEX idx_peers_id ON peers (id);
    CREATE INDEX idx_peers_username ON peers (username);
    CREATE INDEX idx_peers_phone_number ON peers (phone_number);
    CREATE TRIGGER trg_peers_last_update_on
        AFTER UPDATE
        ON peers
    BEGIN
        UPDATE peers
        SET last_update_on = CAST(STRFTIME('%s', 'now') AS INTEGER)
        WHERE id = NEW.id;
    END;
";

/// Column names of a table, empty when the table does not exist
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Read the session row of a Pyrogram session
pub fn read<P: AsRef<Path>>(path: P) -> Result<SessionData> {
    let path = path.as_ref();
    let conn = open_read_only(path)?;

    let columns = table_columns(&conn, "sessions")?;
    let api_id_column = if columns.iter().any(|c| c == "api_id") {
        "api_id"
    } else {
        "NULL"
    };

    let row = conn
        .query_row(
            &format!(
                "SELECT dc_id, {}, test_mode, auth_key, user_id, is_bot FROM sessions LIMIT 1",
                api_id_column
            ),
            [],
            |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, Option<i32>>(1)?,
                    row.get::<_, Option<bool>>(2)?,
                    row.get::<_, Option<Vec<u8>>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<bool>>(5)?,
                ))
            },
        )
        .optional()?;

    let not_authorized = || Error::NotAuthorized {
        path: path.to_path_buf(),
    };

    let (dc_id, api_id, test_mode, auth_key, user_id, is_bot) = row.ok_or_else(not_authorized)?;
    let auth_key = auth_key
        .filter(|k| k.len() == AUTH_KEY_SIZE)
        .ok_or_else(not_authorized)?;

    let mut session = SessionData::from_key_blob(dc_id, &auth_key)?
        .with_user_id(user_id)
        .with_test_mode(test_mode.unwrap_or(false));
    session.api_id = api_id;
    session.is_bot = is_bot.unwrap_or(false);

    tracing::debug!("Pyrogram session {:?}: {:?}", path, session);
    Ok(session)
}

/// Write `session` as a fresh Pyrogram session, replacing any file at `path`
///
/// Pyrogram treats a session without a user id as logged out, so one is required.
pub fn write<P: AsRef<Path>>(path: P, session: &SessionData, default_api_id: i32) -> Result<()> {
    let path = path.as_ref();
    let user_id = session.user_id.ok_or_else(|| Error::UnknownUserId {
        path: path.to_path_buf(),
        sidecar: "<session>.json".to_string(),
    })?;

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
        "INSERT INTO sessions (dc_id, api_id, test_mode, auth_key, date, user_id, is_bot) \
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
        params![
            session.dc_id,
            session.api_id.unwrap_or(default_api_id),
            session.test_mode,
            &session.auth_key[..],
            user_id,
            session.is_bot
        ],
    )?;
    tx.commit()?;

    tracing::info!(
        "Wrote Pyrogram session {:?} (dc {}, user {})",
        path,
        session.dc_id,
        user_id
    );
    Ok(())
}

/// Number of cached peers
pub fn peer_count<P: AsRef<Path>>(path: P) -> Result<usize> {
    let conn = open_read_only(path.as_ref())?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM peers", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// Profile of `user_id` from the peer cache, if Pyrogram stored it
pub fn self_profile<P: AsRef<Path>>(path: P, user_id: i64) -> Result<Option<AccountProfile>> {
    let conn = open_read_only(path.as_ref())?;
    let profile = conn
        .query_row(
            "SELECT username, phone_number FROM peers WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(AccountProfile {
                    user_id: Some(user_id),
                    username: row.get::<_, Option<String>>(0)?,
                    phone: row.get::<_, Option<String>>(1)?,
                    first_name: None,
                    last_name: None,
                })
            },
        )
        .optional()?;
    Ok(profile)
}
