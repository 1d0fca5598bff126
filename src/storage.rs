//! Storage utilities for reading and writing tdata files
//!
//! Handles key files, MTP authorization files and account maps.

use std::fs;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::crypto::{create_local_key, decrypt_local, encrypt_local, generate_salt, AuthKey};
use crate::qdatastream::{QDataStream, QDataStreamWriter};
use crate::{Error, Result, AUTH_KEY_SIZE, MAX_ACCOUNTS};

/// Magic bytes at the start of tdata files
const TDATA_MAGIC: [u8; 4] = [0x54, 0x44, 0x46, 0x24]; // "TDF$"

/// App version stamped into files we write (tdesktop 3.4.0 style encoding)
pub const WRITE_APP_VERSION: u32 = 3_004_000;

/// Block id of the MTP authorization record (dbiMtpAuthorization)
const DBI_MTP_AUTHORIZATION: i32 = 0x4B;

/// Special tag for wide (64-bit) user IDs
const K_WIDE_IDS_TAG: i64 = !0i64;

/// Upper bound on keys in a single MTP authorization record
const MAX_MTP_KEYS: i32 = 10;

/// File descriptor for reading tdata files
#[derive(Debug)]
pub struct FileDescriptor {
    pub version: u32,
    pub data: Vec<u8>,
}

/// Read a tdata file
pub fn read_file(name: &str, base_path: &Path) -> Result<FileDescriptor> {
    let path = base_path.join(name);
    let path_s = base_path.join(format!("{}s", name));

    // Try main file first, then backup (s suffix); is_file() skips directories
    let file_data = if path.is_file() {
        tracing::debug!("Reading main file: {:?}", path);
        fs::read(&path)?
    } else if path_s.is_file() {
        tracing::debug!("Reading backup file: {:?}", path_s);
        fs::read(&path_s)?
    } else {
        return Err(Error::FileNotFound {
            file: name.to_string(),
            folder: base_path.to_path_buf(),
        });
    };

    tracing::debug!("Read {} bytes", file_data.len());
    parse_file_descriptor(&file_data)
}

/// Write a tdata file as `<name>s`
///
/// A stale `<name>` would shadow the new file on read, so it is removed.
pub fn write_file(name: &str, base_path: &Path, version: u32, payload: &[u8]) -> Result<()> {
    fs::create_dir_all(base_path)?;

    let stale = base_path.join(name);
    if stale.is_file() {
        tracing::debug!("Removing stale file: {:?}", stale);
        fs::remove_file(&stale)?;
    }

    let path = base_path.join(format!("{}s", name));
    fs::write(&path, compose_file_descriptor(version, payload))?;
    tracing::debug!("Wrote {} payload bytes to {:?}", payload.len(), path);
    Ok(())
}

/// MD5 over data + dataSize(LE) + version(LE) + magic
fn file_checksum(payload: &[u8], version: u32) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(payload);
    hasher.update((payload.len() as u32).to_le_bytes());
    hasher.update(version.to_le_bytes());
    hasher.update(TDATA_MAGIC);
    hasher.finalize().into()
}

/// Parse a file descriptor from raw bytes
///
/// File format:
/// - bytes[0..4]: magic "TDF$"
/// - bytes[4..8]: version (little endian)
/// - bytes[8..len-16]: data payload
/// - bytes[len-16..len]: MD5 checksum of (data + dataSize + version + magic)
fn parse_file_descriptor(data: &[u8]) -> Result<FileDescriptor> {
    if data.len() < 8 + 16 {
        return Err(Error::invalid_format("file too short"));
    }

    if data[0..4] != TDATA_MAGIC {
        return Err(Error::invalid_format("invalid file magic"));
    }

    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);

    let data_size = data.len() - 8 - 16;
    let payload = &data[8..8 + data_size];
    let file_md5 = &data[data.len() - 16..];

    let computed_md5 = file_checksum(payload, version);

    tracing::debug!(
        "MD5 check: file={:02x?}, computed={:02x?}",
        file_md5,
        computed_md5
    );

    if file_md5 != computed_md5.as_slice() {
        return Err(Error::ChecksumMismatch);
    }

    Ok(FileDescriptor {
        version,
        data: payload.to_vec(),
    })
}

fn compose_file_descriptor(version: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len() + 16);
    out.extend_from_slice(&TDATA_MAGIC);
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&file_checksum(payload, version));
    out
}

/// Key data parsed from key_data file
#[derive(Debug)]
pub struct KeyData {
    pub salt: Vec<u8>,
    pub key_encrypted: Vec<u8>,
    pub info_encrypted: Vec<u8>,
    pub version: u32,
}

/// Parse the key_data file
pub fn read_key_data(base_path: &Path, key_file: &str) -> Result<KeyData> {
    let name = format!("key_{}", key_file);
    let file = read_file(&name, base_path)?;

    let mut stream = QDataStream::new(&file.data);

    let salt = stream.read_qbytearray()?;
    let key_encrypted = stream.read_qbytearray()?;
    let info_encrypted = stream.read_qbytearray()?;

    Ok(KeyData {
        salt,
        key_encrypted,
        info_encrypted,
        version: file.version,
    })
}

/// Decrypted key info containing account indices
#[derive(Debug)]
pub struct KeyInfo {
    pub local_key: AuthKey,
    pub account_indices: Vec<i32>,
}

/// Decrypt the key data
pub fn decrypt_key_data(key_data: &KeyData, passcode: &[u8]) -> Result<KeyInfo> {
    let passcode_key = create_local_key(&key_data.salt, passcode);

    let decrypted_key = match decrypt_local(&key_data.key_encrypted, &passcode_key) {
        Ok(data) => data,
        Err(Error::ChecksumMismatch) if passcode.is_empty() => {
            return Err(Error::PasscodeRequired)
        }
        Err(Error::ChecksumMismatch) => return Err(Error::DecryptionFailed),
        Err(e) => return Err(e),
    };

    if decrypted_key.len() < AUTH_KEY_SIZE {
        return Err(Error::invalid_format(format!(
            "decrypted key too short: {} bytes",
            decrypted_key.len()
        )));
    }

    let local_key = AuthKey::from_bytes(&decrypted_key[..AUTH_KEY_SIZE])?;

    let decrypted_info = decrypt_local(&key_data.info_encrypted, &local_key)?;
    let mut info_stream = QDataStream::new(&decrypted_info);

    let count = info_stream.read_i32()?;

    if count <= 0 || count > MAX_ACCOUNTS as i32 {
        return Err(Error::invalid_format(format!(
            "invalid account count: {}",
            count
        )));
    }

    let mut account_indices = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let index = info_stream.read_i32()?;
        if (0..MAX_ACCOUNTS as i32).contains(&index) {
            account_indices.push(index);
        }
    }

    if !info_stream.at_end() {
        let active = info_stream.read_i32()?;
        tracing::debug!("Active account index: {}", active);
    }

    Ok(KeyInfo {
        local_key,
        account_indices,
    })
}

/// Write the key_data file for a fresh local key
///
/// Layout: salt, key_encrypted (local key under the passcode key) and
/// info_encrypted (count, indices, active index under the local key).
pub fn write_key_data(
    base_path: &Path,
    key_file: &str,
    passcode: &[u8],
    local_key: &AuthKey,
    account_indices: &[i32],
) -> Result<()> {
    if account_indices.is_empty() {
        return Err(Error::NoAccounts);
    }
    if account_indices.len() > MAX_ACCOUNTS {
        return Err(Error::TooManyAccounts {
            count: account_indices.len(),
            max: MAX_ACCOUNTS,
        });
    }

    let salt = generate_salt();
    let passcode_key = create_local_key(&salt, passcode);
    let key_encrypted = encrypt_local(local_key.as_bytes(), &passcode_key);

    let mut info = QDataStreamWriter::new();
    info.write_i32(account_indices.len() as i32);
    for index in account_indices {
        info.write_i32(*index);
    }
    // Active account
    info.write_i32(account_indices[0]);
    let info_encrypted = encrypt_local(&info.into_inner(), local_key);

    let mut stream = QDataStreamWriter::new();
    stream
        .write_qbytearray(&salt)
        .write_qbytearray(&key_encrypted)
        .write_qbytearray(&info_encrypted);

    let name = format!("key_{}", key_file);
    write_file(&name, base_path, WRITE_APP_VERSION, &stream.into_inner())
}

/// Read MTP data file (contains the actual auth key)
///
/// The MTP data is stored in a file named by ToFilePart(ComputeDataNameKey(keyFile))
/// where keyFile is like "data" or "data#2" for multi-account
pub fn read_mtp_data(
    base_path: &Path,
    index: i32,
    local_key: &AuthKey,
    key_file: &str,
) -> Result<MtpData> {
    let file_name = account_file_part(key_file, index);
    tracing::debug!("Looking for MTP data in file: {}", file_name);

    let file = read_file(&file_name, base_path)?;

    let mut stream = QDataStream::new(&file.data);
    let encrypted = stream.read_qbytearray()?;

    let decrypted = decrypt_local(&encrypted, local_key)?;
    parse_mtp_authorization(&decrypted)
}

/// Write the MTP data file for one account
pub fn write_mtp_data(
    base_path: &Path,
    index: i32,
    local_key: &AuthKey,
    key_file: &str,
    mtp: &MtpData,
) -> Result<()> {
    let file_name = account_file_part(key_file, index);

    let mut block = QDataStreamWriter::new();
    block
        .write_i32(DBI_MTP_AUTHORIZATION)
        .write_qbytearray(&serialize_mtp_authorization(mtp));
    let encrypted = encrypt_local(&block.into_inner(), local_key);

    let mut stream = QDataStreamWriter::new();
    stream.write_qbytearray(&encrypted);

    tracing::debug!("Writing MTP data for account {} to {}", index, file_name);
    write_file(&file_name, base_path, WRITE_APP_VERSION, &stream.into_inner())
}

/// Write an empty account map (`<account folder>/maps`)
///
/// Two empty legacy arrays followed by an encrypted map with no entries.
pub fn write_account_map(
    base_path: &Path,
    index: i32,
    local_key: &AuthKey,
    key_file: &str,
) -> Result<()> {
    let account_dir = base_path.join(account_file_part(key_file, index));

    let mut stream = QDataStreamWriter::new();
    stream
        .write_qbytearray(&[])
        .write_qbytearray(&[])
        .write_qbytearray(&encrypt_local(&[], local_key));

    write_file("map", &account_dir, WRITE_APP_VERSION, &stream.into_inner())
}

/// File name (and account folder name) for the account at `index`
pub fn account_file_part(key_file: &str, index: i32) -> String {
    let data_name = compose_data_string(key_file, index);
    to_file_part(compute_data_name_key(&data_name))
}

/// Compose data string: "data" for index 0, "data#2" for index 1, etc.
fn compose_data_string(key_file: &str, index: i32) -> String {
    let base = key_file.replace('#', "");
    if index > 0 {
        format!("{}#{}", base, index + 1)
    } else {
        base
    }
}

/// Compute data name key from key file name using MD5
fn compute_data_name_key(data_name: &str) -> u64 {
    let mut hasher = Md5::new();
    hasher.update(data_name.as_bytes());
    let result: [u8; 16] = hasher.finalize().into();

    // Lower 64 bits, little endian
    u64::from_le_bytes([
        result[0], result[1], result[2], result[3],
        result[4], result[5], result[6], result[7],
    ])
}

/// Convert a FileKey (u64) to a 16-character hex file name, low nibble first
fn to_file_part(val: u64) -> String {
    let mut result = String::with_capacity(16);
    let mut v = val;

    for _ in 0..16 {
        let nibble = (v & 0x0F) as u8;
        let c = if nibble < 0x0A {
            (b'0' + nibble) as char
        } else {
            (b'A' + (nibble - 0x0A)) as char
        };
        result.push(c);
        v >>= 4;
    }

    result
}

/// MTP authorization data
#[derive(Debug, Clone)]
pub struct MtpData {
    pub dc_id: i32,
    pub user_id: i64,
    pub auth_key: [u8; AUTH_KEY_SIZE],
}

/// Parse MTP authorization data from decrypted bytes
///
/// Format:
/// - int32: block_id (must be 0x4B = dbi.MtpAuthorization)
/// - QByteArray: serialized authorization data
///
/// Serialized format:
/// - int32: userId (or kWideIdsTag for new format)
/// - int32: mainDcId (or if kWideIdsTag: int64 userId, int32 mainDcId)
/// - int32: keysCount
/// - for each key:
///   - int32: dcId
///   - bytes[256]: authKey
/// - int32: keysToDestroyCount
/// - ...
fn parse_mtp_authorization(data: &[u8]) -> Result<MtpData> {
    let mut stream = QDataStream::new(data);

    let block_id = stream.read_i32()?;
    if block_id != DBI_MTP_AUTHORIZATION {
        return Err(Error::invalid_format(format!(
            "expected MtpAuthorization block (0x4B), got 0x{:02X}",
            block_id
        )));
    }

    let serialized = stream.read_qbytearray()?;
    let mut auth_stream = QDataStream::new(&serialized);

    let first_int = auth_stream.read_i32()?;
    let second_int = auth_stream.read_i32()?;

    let combined = ((first_int as i64) << 32) | (second_int as u32 as i64);

    let (user_id, main_dc_id) = if combined == K_WIDE_IDS_TAG {
        let uid = auth_stream.read_i64()?;
        let dc = auth_stream.read_i32()?;
        (uid, dc)
    } else {
        (first_int as i64, second_int)
    };

    tracing::debug!("MTP auth: user_id={}, main_dc_id={}", user_id, main_dc_id);

    let keys_count = auth_stream.read_i32()?;
    if !(0..=MAX_MTP_KEYS).contains(&keys_count) {
        return Err(Error::invalid_format(format!(
            "invalid keys count: {}",
            keys_count
        )));
    }

    let mut auth_key: Option<[u8; AUTH_KEY_SIZE]> = None;

    for _ in 0..keys_count {
        let dc_id = auth_stream.read_i32()?;
        let key_bytes = auth_stream.read_raw(AUTH_KEY_SIZE)?;

        tracing::debug!("Found key for DC {}", dc_id);

        if dc_id == main_dc_id {
            let mut key = [0u8; AUTH_KEY_SIZE];
            key.copy_from_slice(&key_bytes);
            auth_key = Some(key);
        }
    }

    let auth_key = auth_key.ok_or_else(|| {
        Error::auth_key_failed(format!("no auth key found for main DC {}", main_dc_id))
    })?;

    Ok(MtpData {
        dc_id: main_dc_id,
        user_id,
        auth_key,
    })
}

/// Serialize the authorization record in the wide-ids layout
fn serialize_mtp_authorization(mtp: &MtpData) -> Vec<u8> {
    let mut auth = QDataStreamWriter::new();
    auth.write_i64(K_WIDE_IDS_TAG)
        .write_i64(mtp.user_id)
        .write_i32(mtp.dc_id)
        .write_i32(1)
        .write_i32(mtp.dc_id)
        .write_raw(&mtp.auth_key)
        // keys to destroy
        .write_i32(0);
    auth.into_inner()
}

/// Get the absolute path, expanding ~ if needed
pub fn get_absolute_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Get default tdata path for the current OS
pub fn get_default_tdata_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        dirs::home_dir().map(|h| h.join(".local/share/TelegramDesktop/tdata"))
    }

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir().map(|h| h.join("Library/Application Support/Telegram Desktop/tdata"))
    }

    #[cfg(target_os = "windows")]
    {
        dirs::data_dir().map(|d| d.join("Telegram Desktop/tdata"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mtp(dc_id: i32, user_id: i64) -> MtpData {
        let mut auth_key = [0u8; AUTH_KEY_SIZE];
        for (i, b) in auth_key.iter_mut().enumerate() {
            *b = i as u8;
        }
        MtpData {
            dc_id,
            user_id,
            auth_key,
        }
    }

    #[test]
    fn test_main_account_file_name() {
        // Well-known name of the first account's files in every tdata folder
        assert_eq!(account_file_part("data", 0), "D877F783D5D3EF8C");
    }

    #[test]
    fn test_compose_data_string() {
        assert_eq!(compose_data_string("data", 0), "data");
        assert_eq!(compose_data_string("data", 1), "data#2");
        assert_eq!(compose_data_string("data", 2), "data#3");
    }

    #[test]
    fn test_to_file_part_low_nibble_first() {
        assert_eq!(to_file_part(0x1), "1000000000000000");
        assert_eq!(to_file_part(0xAB), "BA00000000000000");
    }

    #[test]
    fn test_file_descriptor_written_then_read() {
        let dir = tempfile::tempdir().unwrap();
        write_file("settings", dir.path(), 1_234, b"payload").unwrap();

        assert!(dir.path().join("settingss").is_file());
        let file = read_file("settings", dir.path()).unwrap();
        assert_eq!(file.version, 1_234);
        assert_eq!(file.data, b"payload");
    }

    #[test]
    fn test_write_file_removes_stale_primary() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings"), b"old").unwrap();

        write_file("settings", dir.path(), 1, b"new").unwrap();

        assert!(!dir.path().join("settings").exists());
        assert_eq!(read_file("settings", dir.path()).unwrap().data, b"new");
    }

    #[test]
    fn test_corrupted_file_checksum() {
        let mut bytes = compose_file_descriptor(1, b"payload");
        bytes[9] ^= 0xFF;
        assert!(matches!(
            parse_file_descriptor(&bytes),
            Err(Error::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = compose_file_descriptor(1, b"payload");
        bytes[0] = b'X';
        assert!(parse_file_descriptor(&bytes).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_file("key_data", dir.path()),
            Err(Error::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_mtp_authorization_wide_ids() {
        let mtp = sample_mtp(4, 5_000_000_000);

        let mut block = QDataStreamWriter::new();
        block
            .write_i32(DBI_MTP_AUTHORIZATION)
            .write_qbytearray(&serialize_mtp_authorization(&mtp));

        let parsed = parse_mtp_authorization(&block.into_inner()).unwrap();
        assert_eq!(parsed.dc_id, 4);
        assert_eq!(parsed.user_id, 5_000_000_000);
        assert_eq!(parsed.auth_key, mtp.auth_key);
    }

    #[test]
    fn test_mtp_authorization_narrow_ids() {
        let mtp = sample_mtp(2, 777);

        let mut auth = QDataStreamWriter::new();
        auth.write_i32(777)
            .write_i32(2)
            .write_i32(2)
            .write_i32(1)
            .write_raw(&[0u8; AUTH_KEY_SIZE])
            .write_i32(2)
            .write_raw(&mtp.auth_key)
            .write_i32(0);

        let mut block = QDataStreamWriter::new();
        block
            .write_i32(DBI_MTP_AUTHORIZATION)
            .write_qbytearray(&auth.into_inner());

        let parsed = parse_mtp_authorization(&block.into_inner()).unwrap();
        assert_eq!(parsed.user_id, 777);
        assert_eq!(parsed.dc_id, 2);
        assert_eq!(parsed.auth_key, mtp.auth_key);
    }

    #[test]
    fn test_mtp_authorization_missing_main_key() {
        let mut auth = QDataStreamWriter::new();
        auth.write_i64(K_WIDE_IDS_TAG)
            .write_i64(1)
            .write_i32(2)
            .write_i32(1)
            .write_i32(5)
            .write_raw(&[0u8; AUTH_KEY_SIZE]);

        let mut block = QDataStreamWriter::new();
        block
            .write_i32(DBI_MTP_AUTHORIZATION)
            .write_qbytearray(&auth.into_inner());

        assert!(matches!(
            parse_mtp_authorization(&block.into_inner()),
            Err(Error::AuthKeyExtractionFailed { .. })
        ));
    }

    #[test]
    fn test_key_data_written_then_decrypted() {
        let dir = tempfile::tempdir().unwrap();
        let local_key = AuthKey::generate();

        write_key_data(dir.path(), "data", b"", &local_key, &[0, 1]).unwrap();

        let key_data = read_key_data(dir.path(), "data").unwrap();
        assert_eq!(key_data.version, WRITE_APP_VERSION);

        let info = decrypt_key_data(&key_data, b"").unwrap();
        assert_eq!(info.local_key.as_bytes(), local_key.as_bytes());
        assert_eq!(info.account_indices, vec![0, 1]);
    }

    #[test]
    fn test_key_data_rejects_too_many_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_key_data(dir.path(), "data", b"", &AuthKey::generate(), &[0, 1, 2, 3]);
        assert!(matches!(result, Err(Error::TooManyAccounts { count: 4, .. })));
    }

    #[test]
    fn test_mtp_data_written_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let local_key = AuthKey::generate();
        let mtp = sample_mtp(2, 123_456);

        write_mtp_data(dir.path(), 1, &local_key, "data", &mtp).unwrap();
        write_account_map(dir.path(), 1, &local_key, "data").unwrap();

        let name = account_file_part("data", 1);
        assert!(dir.path().join(format!("{}s", name)).is_file());
        assert!(dir.path().join(&name).join("maps").is_file());

        let read = read_mtp_data(dir.path(), 1, &local_key, "data").unwrap();
        assert_eq!(read.user_id, 123_456);
        assert_eq!(read.dc_id, 2);
        assert_eq!(read.auth_key, mtp.auth_key);
    }

    #[test]
    fn test_get_absolute_path_plain() {
        assert_eq!(
            get_absolute_path(Path::new("/tmp/tdata")),
            PathBuf::from("/tmp/tdata")
        );
    }
}
