//! Conversion between session formats
//!
//! Each source is read into [`SessionData`] accounts, enriched with the
//! account's live profile (or, offline, whatever the session and its sidecar
//! know), and written in the target format.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::Config;
use crate::online::AccountLookup;
use crate::detect::SessionKind;
use crate::discover::Candidate;
use crate::profile::{read_sidecar, sidecar_path, AccountInfo, AccountProfile};
use crate::report::ConversionResult;
use crate::session::SessionData;
use crate::{dc, pyrogram, telethon, Account, Error, Result, TDesktop};

/// Conversion direction chosen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    /// Pick the target from each source's detected format
    Auto,
    #[value(name = "telethon-to-tdata")]
    TelethonToTData,
    #[value(name = "pyrogram-to-tdata")]
    PyrogramToTData,
    #[value(name = "tdata-to-telethon")]
    TDataToTelethon,
    #[value(name = "tdata-to-pyrogram")]
    TDataToPyrogram,
    TelethonToPyrogram,
    PyrogramToTelethon,
}

impl Direction {
    pub const ALL: [Direction; 7] = [
        Direction::Auto,
        Direction::TelethonToTData,
        Direction::PyrogramToTData,
        Direction::TDataToTelethon,
        Direction::TDataToPyrogram,
        Direction::TelethonToPyrogram,
        Direction::PyrogramToTelethon,
    ];

    /// Source format, `None` for auto-detect
    pub fn source(self) -> Option<SessionKind> {
        use SessionKind::*;
        match self {
            Direction::Auto => None,
            Direction::TelethonToTData | Direction::TelethonToPyrogram => Some(Telethon),
            Direction::PyrogramToTData | Direction::PyrogramToTelethon => Some(Pyrogram),
            Direction::TDataToTelethon | Direction::TDataToPyrogram => Some(TData),
        }
    }

    /// Target format for a source of kind `source`
    ///
    /// Auto-detect sends SQLite sessions to tdata and tdata to Telethon.
    pub fn target_for(self, source: SessionKind) -> SessionKind {
        use SessionKind::*;
        match self {
            Direction::Auto => match source {
                Telethon | Pyrogram => TData,
                TData => Telethon,
            },
            Direction::TelethonToTData | Direction::PyrogramToTData => TData,
            Direction::TDataToTelethon | Direction::PyrogramToTelethon => Telethon,
            Direction::TDataToPyrogram | Direction::TelethonToPyrogram => Pyrogram,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source() {
            None => f.write_str("Auto-detect"),
            Some(source) => write!(f, "{} → {}", source, self.target_for(source)),
        }
    }
}

/// Progress stages reported while a candidate is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reading,
    Connecting,
    Writing,
    Done,
    Failed,
}

/// Receives progress for the candidate at `index` (position in the batch)
pub trait Reporter: Send + Sync {
    fn stage(&self, index: usize, source: &Path, stage: Stage);
}

/// Reporter that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Reporter for Silent {
    fn stage(&self, _index: usize, _source: &Path, _stage: Stage) {}
}

/// An account read from a source, with what we know about it
#[derive(Debug, Clone)]
struct LoadedAccount {
    session: SessionData,
    profile: AccountProfile,
    peers: Option<usize>,
    chats: Option<usize>,
    contacts: Option<usize>,
}

impl LoadedAccount {
    fn offline(session: SessionData, profile: AccountProfile, peers: Option<usize>) -> Self {
        Self {
            session,
            profile,
            peers,
            chats: None,
            contacts: None,
        }
    }
}

/// Runs conversions with a shared configuration
///
/// Without a lookup every conversion works offline from the session's own
/// peer cache and its sidecar.
#[derive(Clone)]
pub struct Converter {
    config: Arc<Config>,
    lookup: Option<Arc<dyn AccountLookup>>,
    reporter: Arc<dyn Reporter>,
}

impl Converter {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            lookup: None,
            reporter: Arc::new(Silent),
        }
    }

    /// Look each account up online before writing it
    pub fn with_lookup(mut self, lookup: Arc<dyn AccountLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Convert one candidate; failures are captured in the result
    pub async fn convert_one(
        &self,
        candidate: &Candidate,
        target: SessionKind,
        index: usize,
    ) -> ConversionResult {
        let pending = ConversionResult::pending(&candidate.source, candidate.kind, target);

        match self.try_convert(candidate, target, index).await {
            Ok((info, outputs)) => {
                self.reporter.stage(index, &candidate.source, Stage::Done);
                tracing::info!("Converted {:?} to {} ({} output(s))", candidate.source, target, outputs.len());
                pending.succeed(info, outputs)
            }
            Err(e) => {
                self.reporter.stage(index, &candidate.source, Stage::Failed);
                tracing::warn!("Failed to convert {:?}: {}", candidate.source, e);
                pending.fail(e)
            }
        }
    }

    async fn try_convert(
        &self,
        candidate: &Candidate,
        target: SessionKind,
        index: usize,
    ) -> Result<(AccountInfo, Vec<PathBuf>)> {
        if candidate.kind == target {
            return Err(Error::SameFormat {
                kind: target.to_string(),
            });
        }

        self.reporter.stage(index, &candidate.source, Stage::Reading);
        let mut accounts = {
            let candidate = candidate.clone();
            let config = Arc::clone(&self.config);
            blocking(move || load(&candidate, &config)).await?
        };

        if let Some(lookup) = &self.lookup {
            self.reporter.stage(index, &candidate.source, Stage::Connecting);
            for loaded in &mut accounts {
                look_up(candidate, loaded, lookup.as_ref()).await?;
            }
        }

        let main = accounts.first().ok_or(Error::NoAccounts)?;
        let info = AccountInfo::new(&main.profile, main.session.dc_id, main.peers)
            .with_counts(main.chats, main.contacts);

        self.reporter.stage(index, &candidate.source, Stage::Writing);
        let outputs = {
            let candidate = candidate.clone();
            let config = Arc::clone(&self.config);
            blocking(move || write(&candidate, target, &accounts, &config)).await?
        };

        Ok((info, outputs))
    }

    /// Convert every candidate, at most `config.jobs` at a time
    ///
    /// Results come back in candidate order, one per candidate.
    pub async fn run_batch(
        &self,
        candidates: Vec<Candidate>,
        direction: Direction,
    ) -> Vec<ConversionResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.jobs.max(1)));
        let mut tasks = Vec::with_capacity(candidates.len());

        for (index, candidate) in candidates.into_iter().enumerate() {
            let target = direction.target_for(candidate.kind);
            let fallback = ConversionResult::pending(&candidate.source, candidate.kind, target);
            let semaphore = Arc::clone(&semaphore);
            let converter = self.clone();
            let closed = fallback.clone();

            let task = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return closed.fail(e),
                };
                converter.convert_one(&candidate, target, index).await
            });
            tasks.push((fallback, task));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (fallback, task) in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!("Conversion of {} panicked: {}", fallback.source_name, e);
                    results.push(fallback.fail(Error::TaskFailed {
                        message: e.to_string(),
                    }));
                }
            }
        }
        results
    }
}

/// Run file work off the async workers
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::TaskFailed {
            message: e.to_string(),
        })?
}

/// Fill `loaded` from Telegram
///
/// A rejected key fails the conversion. When Telegram can't be reached the
/// offline details are kept.
async fn look_up(
    candidate: &Candidate,
    loaded: &mut LoadedAccount,
    lookup: &dyn AccountLookup,
) -> Result<()> {
    match lookup.lookup(&loaded.session).await {
        Ok(Some(online)) => {
            let offline = std::mem::take(&mut loaded.profile);
            loaded.profile = online.profile.merge(offline);
            loaded.session.user_id = loaded.profile.user_id.or(loaded.session.user_id);
            loaded.chats = Some(online.chats_count);
            loaded.contacts = Some(online.contacts_count);
            Ok(())
        }
        Ok(None) => Err(Error::NotAuthorized {
            path: candidate.source.clone(),
        }),
        Err(e) => {
            tracing::warn!(
                "{:?}: online lookup failed, using offline details: {}",
                candidate.source,
                e
            );
            Ok(())
        }
    }
}

fn load(candidate: &Candidate, config: &Config) -> Result<Vec<LoadedAccount>> {
    let sidecar = read_sidecar(&candidate.source)?;

    match candidate.kind {
        SessionKind::Telethon => {
            let mut session = telethon::read(&candidate.path)?;
            let mut profile = sidecar.unwrap_or_default();
            session.user_id = session.user_id.or(profile.user_id);
            profile.user_id = session.user_id;
            if let Some(user_id) = session.user_id {
                if let Some(cached) = telethon::self_profile(&candidate.path, user_id)? {
                    profile = profile.merge(cached);
                }
            }
            let peers = telethon::peer_count(&candidate.path).ok();
            Ok(vec![LoadedAccount::offline(session, profile, peers)])
        }
        SessionKind::Pyrogram => {
            let mut session = pyrogram::read(&candidate.path)?;
            let mut profile = AccountProfile {
                user_id: session.user_id,
                ..Default::default()
            };
            if let Some(sidecar) = sidecar {
                profile = profile.merge(sidecar);
            }
            session.user_id = profile.user_id;
            if let Some(user_id) = session.user_id {
                if let Some(cached) = pyrogram::self_profile(&candidate.path, user_id)? {
                    profile = profile.merge(cached);
                }
            }
            let peers = pyrogram::peer_count(&candidate.path).ok();
            Ok(vec![LoadedAccount::offline(session, profile, peers)])
        }
        SessionKind::TData => {
            let tdesktop = TDesktop::with_options(
                &candidate.path,
                config.passcode(),
                Some(config.key_file.as_str()),
            )?;
            let accounts = tdesktop
                .accounts()
                .iter()
                .map(|account| {
                    let mut profile = AccountProfile {
                        user_id: Some(account.user_id()),
                        ..Default::default()
                    };
                    // The sidecar describes one account; attach it where the ids agree
                    if let Some(sidecar) = &sidecar {
                        if (sidecar.user_id.is_none() && account.index() == 0)
                            || sidecar.user_id == Some(account.user_id())
                        {
                            profile = profile.merge(sidecar.clone());
                        }
                    }
                    LoadedAccount::offline(account.to_session_data(), profile, None)
                })
                .collect();
            Ok(accounts)
        }
    }
}

/// Name used for outputs: username, else user id, else `fallback`
pub fn output_stem(profile: &AccountProfile, fallback: &str) -> String {
    if let Some(username) = profile.username.as_deref().filter(|u| !u.is_empty()) {
        return username.to_string();
    }
    if let Some(user_id) = profile.user_id {
        return user_id.to_string();
    }
    fallback.to_string()
}

fn source_stem(candidate: &Candidate) -> String {
    candidate
        .source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

fn unknown_user_id(candidate: &Candidate) -> Error {
    let sidecar = sidecar_path(&candidate.source)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Error::UnknownUserId {
        path: candidate.source.clone(),
        sidecar,
    }
}

fn write(
    candidate: &Candidate,
    target: SessionKind,
    accounts: &[LoadedAccount],
    config: &Config,
) -> Result<Vec<PathBuf>> {
    match target {
        SessionKind::TData => Ok(vec![write_tdata(candidate, accounts, config)?]),
        SessionKind::Telethon | SessionKind::Pyrogram => {
            write_sessions(candidate, target, accounts, config)
        }
    }
}

fn write_tdata(
    candidate: &Candidate,
    accounts: &[LoadedAccount],
    config: &Config,
) -> Result<PathBuf> {
    let main = accounts.first().ok_or(Error::NoAccounts)?;
    let tdata_accounts = accounts
        .iter()
        .enumerate()
        .map(|(slot, loaded)| {
            if !dc::is_known(loaded.session.dc_id) {
                tracing::warn!("{:?}: unknown DC {}", candidate.source, loaded.session.dc_id);
            }
            Account::from_session_data(slot as i32, &loaded.session)
                .ok_or_else(|| unknown_user_id(candidate))
        })
        .collect::<Result<Vec<_>>>()?;

    let folder = format!("tdata_{}", output_stem(&main.profile, "unknown"));
    let out = config.tdatas_dir.join(folder);

    TDesktop::create(&out, tdata_accounts, config.passcode(), Some(config.key_file.as_str()))?;
    Ok(out)
}

fn write_sessions(
    candidate: &Candidate,
    target: SessionKind,
    accounts: &[LoadedAccount],
    config: &Config,
) -> Result<Vec<PathBuf>> {
    let dir = config.output_dir.join(target.label().to_lowercase());
    let fallback = source_stem(candidate);

    let mut outputs = Vec::with_capacity(accounts.len());
    for loaded in accounts {
        let name = format!("{}.session", output_stem(&loaded.profile, &fallback));
        let out = dir.join(name);

        match target {
            SessionKind::Pyrogram => {
                if loaded.session.user_id.is_none() {
                    return Err(unknown_user_id(candidate));
                }
                pyrogram::write(&out, &loaded.session, config.api_id)?
            }
            _ => telethon::write(&out, &loaded.session)?,
        }
        outputs.push(out);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::online::OnlineAccount;
    use crate::report::Status;
    use crate::AUTH_KEY_SIZE;
    use std::sync::Mutex;

    fn key(fill: u8) -> [u8; AUTH_KEY_SIZE] {
        [fill; AUTH_KEY_SIZE]
    }

    fn candidate(source: PathBuf, kind: SessionKind) -> Candidate {
        Candidate {
            path: source.clone(),
            source,
            kind,
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(usize, Stage)>>);

    impl Reporter for Recorder {
        fn stage(&self, index: usize, _source: &Path, stage: Stage) {
            self.0.lock().unwrap().push((index, stage));
        }
    }

    /// Answers every lookup the same way; `Err` text becomes a network error
    struct FakeTelegram(std::result::Result<Option<OnlineAccount>, String>);

    #[async_trait::async_trait]
    impl AccountLookup for FakeTelegram {
        async fn lookup(&self, _session: &SessionData) -> Result<Option<OnlineAccount>> {
            self.0.clone().map_err(Error::network)
        }
    }

    fn online_user(user_id: i64, username: &str) -> OnlineAccount {
        OnlineAccount {
            profile: AccountProfile {
                user_id: Some(user_id),
                first_name: Some("Real".into()),
                username: Some(username.into()),
                phone: Some("447700900123".into()),
                ..Default::default()
            },
            chats_count: 10,
            contacts_count: 4,
        }
    }

    #[test]
    fn test_auto_targets() {
        assert_eq!(Direction::Auto.target_for(SessionKind::Telethon), SessionKind::TData);
        assert_eq!(Direction::Auto.target_for(SessionKind::Pyrogram), SessionKind::TData);
        assert_eq!(Direction::Auto.target_for(SessionKind::TData), SessionKind::Telethon);
        assert_eq!(Direction::Auto.source(), None);
    }

    #[test]
    fn test_direction_labels() {
        assert_eq!(Direction::Auto.to_string(), "Auto-detect");
        assert_eq!(Direction::TelethonToTData.to_string(), "Telethon → TData");
        assert_eq!(Direction::TDataToPyrogram.to_string(), "TData → Pyrogram");
        assert_eq!(Direction::PyrogramToTelethon.to_string(), "Pyrogram → Telethon");
    }

    #[test]
    fn test_direction_cli_names() {
        use clap::ValueEnum;
        let names: Vec<_> = Direction::value_variants()
            .iter()
            .filter_map(|d| d.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "auto",
                "telethon-to-tdata",
                "pyrogram-to-tdata",
                "tdata-to-telethon",
                "tdata-to-pyrogram",
                "telethon-to-pyrogram",
                "pyrogram-to-telethon",
            ]
        );
    }

    #[test]
    fn test_output_stem() {
        let mut profile = AccountProfile::default();
        assert_eq!(output_stem(&profile, "src"), "src");
        profile.user_id = Some(5);
        assert_eq!(output_stem(&profile, "src"), "5");
        profile.username = Some("bob".into());
        assert_eq!(output_stem(&profile, "src"), "bob");
    }

    #[tokio::test]
    async fn test_pyrogram_to_tdata() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let source = config.sessions_dir.join("acc.session");
        pyrogram::write(
            &source,
            &SessionData::new(4, key(0x10)).with_user_id(Some(555)),
            2040,
        )
        .unwrap();

        let recorder = Arc::new(Recorder::default());
        let converter = Converter::new(config.clone()).with_reporter(recorder.clone());
        let result = converter
            .convert_one(&candidate(source, SessionKind::Pyrogram), SessionKind::TData, 3)
            .await;

        assert_eq!(result.status, Status::Success, "{:?}", result.error);
        let out = config.tdatas_dir.join("tdata_555");
        assert_eq!(result.output_paths, vec![out.display().to_string()]);

        let tdesktop = TDesktop::from_path(&out).unwrap();
        let account = tdesktop.main_account().unwrap();
        assert_eq!(account.user_id(), 555);
        assert_eq!(account.dc_id(), 4);
        assert_eq!(account.auth_key_bytes(), &key(0x10));

        let info = result.account_info.unwrap();
        assert_eq!(info.user_id, Some(555));
        assert_eq!(info.dc_id, 4);
        assert_eq!(info.peers_count, Some(0));
        assert_eq!(info.chats_count, None);

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![(3, Stage::Reading), (3, Stage::Writing), (3, Stage::Done)]
        );
    }

    #[tokio::test]
    async fn test_telethon_to_tdata_needs_user_id() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let source = config.sessions_dir.join("anon.session");
        telethon::write(&source, &SessionData::new(2, key(0x20))).unwrap();

        let result = Converter::new(config)
            .convert_one(&candidate(source, SessionKind::Telethon), SessionKind::TData, 0)
            .await;
        assert_eq!(result.status, Status::Error);
        let error = result.error.unwrap();
        assert!(error.contains("anon.json"), "{}", error);
        assert!(result.account_info.is_none());
    }

    #[tokio::test]
    async fn test_telethon_to_tdata_with_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let source = config.sessions_dir.join("acc.session");
        telethon::write(&source, &SessionData::new(2, key(0x30))).unwrap();
        std::fs::write(
            config.sessions_dir.join("acc.json"),
            r#"{"user_id": 9001, "username": "neo", "first_name": "Thomas", "phone": "15551234"}"#,
        )
        .unwrap();

        let result = Converter::new(config.clone())
            .convert_one(&candidate(source, SessionKind::Telethon), SessionKind::TData, 0)
            .await;
        assert!(result.is_success(), "{:?}", result.error);

        let info = result.account_info.unwrap();
        assert_eq!(info.name, "Thomas");
        assert_eq!(info.username_display, "@neo");
        assert_eq!(info.phone, "15551234");

        let out = config.tdatas_dir.join("tdata_neo");
        let loaded = TDesktop::from_path(&out).unwrap();
        assert_eq!(loaded.main_account().unwrap().user_id(), 9001);
    }

    #[tokio::test]
    async fn test_online_lookup_fills_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let source = config.sessions_dir.join("acc.session");
        telethon::write(&source, &SessionData::new(2, key(0x31))).unwrap();
        std::fs::write(config.sessions_dir.join("acc.json"), r#"{"username": "stale"}"#).unwrap();

        let recorder = Arc::new(Recorder::default());
        let converter = Converter::new(config.clone())
            .with_reporter(recorder.clone())
            .with_lookup(Arc::new(FakeTelegram(Ok(Some(online_user(123456, "real"))))));
        let result = converter
            .convert_one(&candidate(source, SessionKind::Telethon), SessionKind::TData, 0)
            .await;
        assert!(result.is_success(), "{:?}", result.error);

        let info = result.account_info.unwrap();
        assert_eq!(info.user_id, Some(123456));
        assert_eq!(info.username_display, "@real");
        assert_eq!(info.name, "Real");
        assert_eq!(info.chats_count, Some(10));
        assert_eq!(info.contacts_count, Some(4));

        let out = config.tdatas_dir.join("tdata_real");
        let loaded = TDesktop::from_path(&out).unwrap();
        assert_eq!(loaded.main_account().unwrap().user_id(), 123456);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                (0, Stage::Reading),
                (0, Stage::Connecting),
                (0, Stage::Writing),
                (0, Stage::Done)
            ]
        );
    }

    #[tokio::test]
    async fn test_online_rejected_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let source = config.sessions_dir.join("revoked.session");
        pyrogram::write(&source, &SessionData::new(2, key(0x32)).with_user_id(Some(8)), 2040)
            .unwrap();

        let converter =
            Converter::new(config.clone()).with_lookup(Arc::new(FakeTelegram(Ok(None))));
        let result = converter
            .convert_one(&candidate(source, SessionKind::Pyrogram), SessionKind::TData, 0)
            .await;

        assert_eq!(result.status, Status::Error);
        assert!(result.error.unwrap().contains("not authorized"));
        assert!(!config.tdatas_dir.join("tdata_8").exists());
    }

    #[tokio::test]
    async fn test_online_failure_keeps_offline_details() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let source = config.sessions_dir.join("acc.session");
        telethon::write(&source, &SessionData::new(2, key(0x33))).unwrap();
        std::fs::write(config.sessions_dir.join("acc.json"), r#"{"user_id": 77}"#).unwrap();

        let converter = Converter::new(config.clone())
            .with_lookup(Arc::new(FakeTelegram(Err("connection refused".into()))));
        let result = converter
            .convert_one(&candidate(source, SessionKind::Telethon), SessionKind::TData, 0)
            .await;

        assert!(result.is_success(), "{:?}", result.error);
        let info = result.account_info.unwrap();
        assert_eq!(info.user_id, Some(77));
        assert_eq!(info.chats_count, None);
        assert!(config.tdatas_dir.join("tdata_77").join("key_datas").is_file());
    }

    #[tokio::test]
    async fn test_tdata_to_sessions_per_account() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let source = config.tdatas_dir.join("desk");
        TDesktop::create(
            &source,
            vec![
                Account::new(0, 2, 100, key(0x01)),
                Account::new(1, 5, 200, key(0x02)),
            ],
            None,
            None,
        )
        .unwrap();

        let converter = Converter::new(config.clone());
        let result = converter
            .convert_one(&candidate(source.clone(), SessionKind::TData), SessionKind::Pyrogram, 0)
            .await;
        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.output_paths.len(), 2);

        let second = pyrogram::read(config.output_dir.join("pyrogram").join("200.session")).unwrap();
        assert_eq!(second.user_id, Some(200));
        assert_eq!(second.dc_id, 5);
        assert_eq!(second.api_id, Some(2040));
        assert_eq!(second.auth_key, key(0x02));

        let result = converter
            .convert_one(&candidate(source, SessionKind::TData), SessionKind::Telethon, 0)
            .await;
        assert!(result.is_success(), "{:?}", result.error);
        let first = telethon::read(config.output_dir.join("telethon").join("100.session")).unwrap();
        assert_eq!(first.dc_id, 2);
        assert_eq!(first.auth_key, key(0x01));
    }

    fn two_account_tdata(config: &Config) -> PathBuf {
        let source = config.tdatas_dir.join("desk");
        TDesktop::create(
            &source,
            vec![
                Account::new(0, 2, 100, key(0x01)),
                Account::new(1, 5, 200, key(0x02)),
            ],
            None,
            None,
        )
        .unwrap();
        source
    }

    #[tokio::test]
    async fn test_tdata_sidecar_attaches_by_user_id() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let source = two_account_tdata(&config);
        std::fs::write(
            config.tdatas_dir.join("desk.json"),
            r#"{"user_id": 200, "username": "second"}"#,
        )
        .unwrap();

        let result = Converter::new(config.clone())
            .convert_one(&candidate(source, SessionKind::TData), SessionKind::Telethon, 0)
            .await;
        assert!(result.is_success(), "{:?}", result.error);

        let telethon_dir = config.output_dir.join("telethon");
        assert_eq!(
            result.output_paths,
            vec![
                telethon_dir.join("100.session").display().to_string(),
                telethon_dir.join("second.session").display().to_string(),
            ]
        );
        assert_eq!(result.account_info.unwrap().username, None);
    }

    #[tokio::test]
    async fn test_tdata_sidecar_without_id_goes_to_first_account() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let source = two_account_tdata(&config);
        std::fs::write(
            config.tdatas_dir.join("desk.json"),
            r#"{"username": "first", "phone": "123"}"#,
        )
        .unwrap();

        let result = Converter::new(config.clone())
            .convert_one(&candidate(source, SessionKind::TData), SessionKind::Pyrogram, 0)
            .await;
        assert!(result.is_success(), "{:?}", result.error);

        let pyrogram_dir = config.output_dir.join("pyrogram");
        assert_eq!(
            result.output_paths,
            vec![
                pyrogram_dir.join("first.session").display().to_string(),
                pyrogram_dir.join("200.session").display().to_string(),
            ]
        );
        let info = result.account_info.unwrap();
        assert_eq!(info.user_id, Some(100));
        assert_eq!(info.phone, "123");
    }

    #[tokio::test]
    async fn test_tdata_folder_named_by_username_or_user_id() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let converter = Converter::new(config.clone());

        let named = config.sessions_dir.join("named.session");
        pyrogram::write(&named, &SessionData::new(2, key(0x41)).with_user_id(Some(41)), 2040)
            .unwrap();
        std::fs::write(config.sessions_dir.join("named.json"), r#"{"username": "@alice"}"#)
            .unwrap();
        let plain = config.sessions_dir.join("plain.session");
        pyrogram::write(&plain, &SessionData::new(2, key(0x42)).with_user_id(Some(42)), 2040)
            .unwrap();

        let named = converter
            .convert_one(&candidate(named, SessionKind::Pyrogram), SessionKind::TData, 0)
            .await;
        let plain = converter
            .convert_one(&candidate(plain, SessionKind::Pyrogram), SessionKind::TData, 1)
            .await;

        assert_eq!(
            named.output_paths,
            vec![config.tdatas_dir.join("tdata_alice").display().to_string()]
        );
        assert_eq!(
            plain.output_paths,
            vec![config.tdatas_dir.join("tdata_42").display().to_string()]
        );
    }

    #[tokio::test]
    async fn test_passcode_tdata_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path());
        let source = config.tdatas_dir.join("locked");
        TDesktop::create(&source, vec![Account::new(0, 1, 7, key(0x07))], Some("pw"), None)
            .unwrap();

        let failed = Converter::new(config.clone())
            .convert_one(&candidate(source.clone(), SessionKind::TData), SessionKind::Telethon, 0)
            .await;
        assert_eq!(failed.status, Status::Error);
        assert!(failed.error.unwrap().contains("passcode"));

        config.passcode = Some("pw".into());
        let ok = Converter::new(config)
            .convert_one(&candidate(source, SessionKind::TData), SessionKind::Telethon, 0)
            .await;
        assert!(ok.is_success(), "{:?}", ok.error);
    }

    #[tokio::test]
    async fn test_same_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let result = Converter::new(config)
            .convert_one(
                &candidate(dir.path().join("x.session"), SessionKind::Telethon),
                SessionKind::Telethon,
                0,
            )
            .await;
        assert_eq!(result.status, Status::Error);
    }

    #[tokio::test]
    async fn test_chain_keeps_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let source = config.sessions_dir.join("chain.session");
        pyrogram::write(&source, &SessionData::new(3, key(0x77)).with_user_id(Some(31)), 6)
            .unwrap();

        let to_telethon = Converter::new(config)
            .convert_one(&candidate(source, SessionKind::Pyrogram), SessionKind::Telethon, 0)
            .await;
        assert!(to_telethon.is_success(), "{:?}", to_telethon.error);

        let telethon_path = PathBuf::from(&to_telethon.output_paths[0]);
        let session = telethon::read(&telethon_path).unwrap();
        assert_eq!(session.dc_id, 3);
        assert_eq!(session.server_address, "149.154.175.100");
        assert_eq!(session.auth_key, key(0x77));
    }

    fn pyrogram_batch(config: &Config) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for (i, user_id) in [11i64, 22, 33].iter().enumerate() {
            let source = config.sessions_dir.join(format!("s{}.session", i));
            pyrogram::write(
                &source,
                &SessionData::new(2, key(i as u8 + 1)).with_user_id(Some(*user_id)),
                2040,
            )
            .unwrap();
            candidates.push(candidate(source, SessionKind::Pyrogram));
        }
        candidates
    }

    #[tokio::test]
    async fn test_run_batch_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path());
        config.jobs = 2;

        let mut candidates = pyrogram_batch(&config);
        candidates.push(candidate(
            config.sessions_dir.join("missing.session"),
            SessionKind::Telethon,
        ));

        let results = Converter::new(config.clone())
            .run_batch(candidates, Direction::Auto)
            .await;

        assert_eq!(results.len(), 4);
        let names: Vec<_> = results.iter().map(|r| r.source_name.clone()).collect();
        assert_eq!(
            names,
            vec!["s0.session", "s1.session", "s2.session", "missing.session"]
        );
        assert!(results[..3].iter().all(|r| r.is_success()));
        assert_eq!(results[3].status, Status::Error);
        assert!(config.tdatas_dir.join("tdata_22").join("key_datas").is_file());
    }

    /// Panics while the second candidate is being read
    struct PanicsOnSecond;

    impl Reporter for PanicsOnSecond {
        fn stage(&self, index: usize, _source: &Path, stage: Stage) {
            if index == 1 && stage == Stage::Reading {
                panic!("reporter failure");
            }
        }
    }

    #[tokio::test]
    async fn test_run_batch_keeps_row_of_panicked_task() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let candidates = pyrogram_batch(&config);

        let results = Converter::new(config)
            .with_reporter(Arc::new(PanicsOnSecond))
            .run_batch(candidates, Direction::PyrogramToTelethon)
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success(), "{:?}", results[0].error);
        assert_eq!(results[1].source_name, "s1.session");
        assert_eq!(results[1].status, Status::Error);
        assert!(results[1]
            .error
            .as_deref()
            .unwrap()
            .starts_with("conversion task failed"));
        assert!(results[2].is_success(), "{:?}", results[2].error);
    }
}
