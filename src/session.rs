//! Format-independent session model
//!
//! Every conversion reads its source into a [`SessionData`] and writes the
//! target from it.

use crate::{dc, Error, Result, AUTH_KEY_SIZE};

/// One authorized account, detached from any on-disk format
#[derive(Clone)]
pub struct SessionData {
    /// Home datacenter of the account
    pub dc_id: i32,
    /// Authorization key for `dc_id`
    pub auth_key: [u8; AUTH_KEY_SIZE],
    /// Telegram user id, when the source records it
    pub user_id: Option<i64>,
    /// API id the session was created with (Pyrogram only)
    pub api_id: Option<i32>,
    pub test_mode: bool,
    pub is_bot: bool,
    pub server_address: String,
    pub port: u16,
}

impl SessionData {
    /// Build session data for a DC, filling the server address from the DC table
    pub fn new(dc_id: i32, auth_key: [u8; AUTH_KEY_SIZE]) -> Self {
        Self {
            dc_id,
            auth_key,
            user_id: None,
            api_id: None,
            test_mode: false,
            is_bot: false,
            server_address: dc::address(dc_id, false).to_string(),
            port: dc::DC_PORT,
        }
    }

    /// Build from an auth key blob of unchecked length
    pub fn from_key_blob(dc_id: i32, blob: &[u8]) -> Result<Self> {
        let auth_key: [u8; AUTH_KEY_SIZE] = blob.try_into().map_err(|_| {
            Error::auth_key_failed(format!(
                "auth key must be {} bytes, got {}",
                AUTH_KEY_SIZE,
                blob.len()
            ))
        })?;
        Ok(Self::new(dc_id, auth_key))
    }

    pub fn with_user_id(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self.server_address = dc::address(self.dc_id, test_mode).to_string();
        self
    }

    /// Short fingerprint of the auth key for logs
    pub fn key_fingerprint(&self) -> String {
        hex::encode(&self.auth_key[..4])
    }
}

impl std::fmt::Debug for SessionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose key in debug output
        f.debug_struct("SessionData")
            .field("dc_id", &self.dc_id)
            .field("user_id", &self.user_id)
            .field("api_id", &self.api_id)
            .field("test_mode", &self.test_mode)
            .field("is_bot", &self.is_bot)
            .field("server_address", &self.server_address)
            .field("port", &self.port)
            .field("key", &self.key_fingerprint())
            .finish()
    }
}
