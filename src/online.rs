//! Account lookup over MTProto
//!
//! Connects with the session's own auth key, checks that it is still
//! authorized and reads the account's profile plus its dialog and contact
//! counts. Nothing is written back to Telegram.

use std::net::{Ipv4Addr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grammers_client::Client;
use grammers_mtsender::{InvocationError, SenderPool};
use grammers_session::defs::DcOption;
use grammers_session::storages::MemorySession;
use grammers_tl_types as tl;

use crate::profile::AccountProfile;
use crate::session::SessionData;
use crate::{Error, Result};

/// How long one account lookup may take
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// What Telegram reports about an authorized account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineAccount {
    pub profile: AccountProfile,
    pub chats_count: usize,
    pub contacts_count: usize,
}

/// Source of live account details
#[async_trait]
pub trait AccountLookup: Send + Sync {
    /// Look up the account behind `session`
    ///
    /// `Ok(None)` means the server rejected the key (logged out or revoked).
    async fn lookup(&self, session: &SessionData) -> Result<Option<OnlineAccount>>;
}

/// Lookup against the real Telegram servers
#[derive(Debug, Clone)]
pub struct Telegram {
    api_id: i32,
    timeout: Duration,
}

impl Telegram {
    pub fn new(api_id: i32) -> Self {
        Self {
            api_id,
            timeout: LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AccountLookup for Telegram {
    async fn lookup(&self, session: &SessionData) -> Result<Option<OnlineAccount>> {
        let storage = Arc::new(MemorySession::from(grammers_session_data(session)?));
        let pool = SenderPool::new(Arc::clone(&storage), self.api_id);
        let client = Client::new(&pool);
        let SenderPool { runner, .. } = pool;
        let pool_task = tokio::spawn(runner.run());

        tracing::debug!(
            "Connecting to DC {} ({}:{}) with key {}",
            session.dc_id,
            session.server_address,
            session.port,
            session.key_fingerprint()
        );
        let result = tokio::time::timeout(self.timeout, fetch_account(&client)).await;

        drop(client);
        pool_task.abort();

        match result {
            Ok(account) => account,
            Err(_) => Err(Error::network(format!(
                "no answer from DC {} within {}s",
                session.dc_id,
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Session data for a grammers client holding only the home DC's key
fn grammers_session_data(session: &SessionData) -> Result<grammers_session::SessionData> {
    let ipv4: Ipv4Addr = session.server_address.parse().map_err(|_| {
        Error::invalid_format(format!(
            "server address is not IPv4: {}",
            session.server_address
        ))
    })?;
    let ipv6 = ipv4.to_ipv6_mapped();

    let mut data = grammers_session::SessionData {
        home_dc: session.dc_id,
        ..grammers_session::SessionData::default()
    };
    data.dc_options.insert(
        session.dc_id,
        DcOption {
            id: session.dc_id,
            ipv4: SocketAddrV4::new(ipv4, session.port),
            ipv6: SocketAddrV6::new(ipv6, session.port, 0, 0),
            auth_key: Some(session.auth_key),
        },
    );
    Ok(data)
}

fn is_unauthorized(error: &InvocationError) -> bool {
    matches!(error, InvocationError::Rpc(rpc) if rpc.code == 401)
}

fn network_error(error: InvocationError) -> Error {
    Error::network(error.to_string())
}

async fn fetch_account(client: &Client) -> Result<Option<OnlineAccount>> {
    match client.is_authorized().await {
        Ok(true) => {}
        Ok(false) => return Ok(None),
        Err(e) if is_unauthorized(&e) => return Ok(None),
        Err(e) => return Err(network_error(e)),
    }

    let users = match client
        .invoke(&tl::functions::users::GetUsers {
            id: vec![tl::enums::InputUser::UserSelf],
        })
        .await
    {
        Ok(users) => users,
        Err(e) if is_unauthorized(&e) => return Ok(None),
        Err(e) => return Err(network_error(e)),
    };

    let Some(me) = users.into_iter().find_map(|user| match user {
        tl::enums::User::User(user) => Some(user),
        tl::enums::User::Empty(_) => None,
    }) else {
        return Ok(None);
    };

    let profile = AccountProfile {
        user_id: Some(me.id),
        first_name: me.first_name,
        last_name: me.last_name,
        username: me.username,
        phone: me.phone,
    };
    tracing::info!("Authorized as user {}", me.id);

    let dialogs = client
        .invoke(&tl::functions::messages::GetDialogs {
            exclude_pinned: false,
            folder_id: None,
            offset_date: 0,
            offset_id: 0,
            offset_peer: tl::enums::InputPeer::Empty,
            limit: 1,
            hash: 0,
        })
        .await
        .map_err(network_error)?;
    let chats_count = match dialogs {
        tl::enums::messages::Dialogs::Dialogs(d) => d.dialogs.len(),
        tl::enums::messages::Dialogs::Slice(s) => s.count.max(0) as usize,
        tl::enums::messages::Dialogs::NotModified(n) => n.count.max(0) as usize,
    };

    // A contacts failure is not worth failing the conversion for
    let contacts_count = match client
        .invoke(&tl::functions::contacts::GetContacts { hash: 0 })
        .await
    {
        Ok(tl::enums::contacts::Contacts::Contacts(c)) => c.contacts.len(),
        Ok(tl::enums::contacts::Contacts::NotModified) => 0,
        Err(e) => {
            tracing::warn!("Could not count contacts of user {}: {}", me.id, e);
            0
        }
    };

    Ok(Some(OnlineAccount {
        profile,
        chats_count,
        contacts_count,
    }))
}
