//! Account representation

use crate::session::SessionData;
use crate::AUTH_KEY_SIZE;

/// A Telegram account stored in tdata
#[derive(Debug, Clone)]
pub struct Account {
    /// Account index (0-2)
    index: i32,
    /// Datacenter ID (1-5)
    dc_id: i32,
    /// User ID
    user_id: i64,
    /// Authorization key (256 bytes)
    auth_key: [u8; AUTH_KEY_SIZE],
}

impl Account {
    /// Create a new account
    pub fn new(index: i32, dc_id: i32, user_id: i64, auth_key: [u8; AUTH_KEY_SIZE]) -> Self {
        Self {
            index,
            dc_id,
            user_id,
            auth_key,
        }
    }

    /// Account for slot `index` built from neutral session data
    ///
    /// Returns `None` when the session does not know its user id.
    pub fn from_session_data(index: i32, session: &SessionData) -> Option<Self> {
        session
            .user_id
            .map(|user_id| Self::new(index, session.dc_id, user_id, session.auth_key))
    }

    /// Get the account index (0-2)
    pub fn index(&self) -> i32 {
        self.index
    }

    /// Get the datacenter ID (1-5)
    pub fn dc_id(&self) -> i32 {
        self.dc_id
    }

    /// Get the user ID
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Get the raw auth key bytes
    pub fn auth_key_bytes(&self) -> &[u8; AUTH_KEY_SIZE] {
        &self.auth_key
    }

    /// Convert to format-independent session data
    pub fn to_session_data(&self) -> SessionData {
        SessionData::new(self.dc_id, self.auth_key).with_user_id(Some(self.user_id))
    }
}
