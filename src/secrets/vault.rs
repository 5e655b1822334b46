//! Vault 파일 기반 Secret Store
//!
//! 파일 포맷 (v1):
//! - magic: `NSCVLT01` (8 bytes)
//! - nonce: 24 bytes (XChaCha20-Poly1305)
//! - ciphertext: AEAD 결과 (= 암호문 + 태그)
//!
//! AAD: magic을 AAD로 사용 (포맷 바인딩)
//!
//! 모든 쓰기는 전체 vault를 고유한 임시 파일에 쓰고 rename 합니다.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zeroize::{Zeroize, Zeroizing};

use crate::secrets::{validate_key, MasterKey, SecretStore, SecretStoreError};

/// 파일 매직 (8 bytes)
pub const VAULT_MAGIC: &[u8; 8] = b"NSCVLT01";

/// 마스터키 길이 (256-bit)
pub const MASTER_KEY_LEN: usize = 32;

/// Nonce 길이 (XChaCha20-Poly1305용 24 bytes)
pub const NONCE_LEN: usize = 24;

/// Vault 오류
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid vault magic")]
    InvalidMagic,

    #[error("Invalid vault format: {0}")]
    InvalidFormat(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<VaultError> for SecretStoreError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Io(_) | VaultError::EncryptionFailed(_) => {
                SecretStoreError::Unavailable(err.to_string())
            }
            VaultError::InvalidMagic
            | VaultError::InvalidFormat(_)
            | VaultError::DecryptionFailed(_)
            | VaultError::Serialization(_) => SecretStoreError::Corrupt(err.to_string()),
        }
    }
}

/// Vault에 저장되는 페이로드 (값은 base64)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultPayload {
    pub entries: BTreeMap<String, String>,
    /// 페이로드 버전 (향후 마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl Default for VaultPayload {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            version: default_version(),
        }
    }
}

impl Drop for VaultPayload {
    fn drop(&mut self) {
        for value in self.entries.values_mut() {
            value.zeroize();
        }
    }
}

/// 마스터키를 사용해 페이로드를 암호화하고 vault 파일에 저장
pub fn encrypt_and_write(
    path: &Path,
    master_key: &[u8; MASTER_KEY_LEN],
    payload: &VaultPayload,
) -> Result<(), VaultError> {
    let plaintext = Zeroizing::new(serde_json::to_vec(payload)?);

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill(&mut nonce);

    let cipher = XChaCha20Poly1305::new(master_key.into());

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext.as_ref(),
                aad: VAULT_MAGIC,
            },
        )
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    // 같은 디렉토리의 고유 임시 파일에 쓰고 rename (프로세스마다 다른 파일)
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(VAULT_MAGIC)?;
    file.write_all(&nonce)?;
    file.write_all(&ciphertext)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Vault 파일을 읽고 마스터키로 복호화
pub fn read_and_decrypt(
    path: &Path,
    master_key: &[u8; MASTER_KEY_LEN],
) -> Result<VaultPayload, VaultError> {
    let mut file = fs::File::open(path)?;

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)
        .map_err(|_| VaultError::InvalidFormat("truncated header".to_string()))?;
    if &magic != VAULT_MAGIC {
        return Err(VaultError::InvalidMagic);
    }

    let mut nonce = [0u8; NONCE_LEN];
    file.read_exact(&mut nonce)
        .map_err(|_| VaultError::InvalidFormat("truncated nonce".to_string()))?;

    // 나머지 = ciphertext
    let mut ciphertext = Vec::new();
    file.read_to_end(&mut ciphertext)?;

    let cipher = XChaCha20Poly1305::new(master_key.into());

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext.as_ref(),
                    aad: VAULT_MAGIC,
                },
            )
            .map_err(|e| VaultError::DecryptionFailed(e.to_string()))?,
    );

    let payload: VaultPayload = serde_json::from_slice(&plaintext)?;
    Ok(payload)
}

/// container 디렉토리 기반 vault 경로 생성
pub fn get_vault_path(container_dir: &Path) -> PathBuf {
    container_dir.join("secrets.vault")
}

/// AEAD 암호화 파일 하나를 저장소로 사용하는 Secret Store
pub struct VaultSecretStore {
    path: PathBuf,
    master_key: MasterKey,
    /// 프로세스 내 read-modify-write 직렬화
    lock: Mutex<()>,
}

impl VaultSecretStore {
    pub fn new(path: PathBuf, master_key: MasterKey) -> Self {
        Self {
            path,
            master_key,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<VaultPayload, SecretStoreError> {
        if !self.path.exists() {
            return Ok(VaultPayload::default());
        }
        Ok(read_and_decrypt(&self.path, self.master_key.as_bytes())?)
    }

    fn persist(&self, payload: &VaultPayload) -> Result<(), SecretStoreError> {
        Ok(encrypt_and_write(
            &self.path,
            self.master_key.as_bytes(),
            payload,
        )?)
    }

    fn locked<T>(
        &self,
        f: impl FnOnce() -> Result<T, SecretStoreError>,
    ) -> Result<T, SecretStoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| SecretStoreError::Unavailable(format!("lock poisoned: {}", e)))?;
        f()
    }
}

impl SecretStore for VaultSecretStore {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        validate_key(key)?;
        self.locked(|| {
            let mut payload = self.load()?;
            if payload.entries.contains_key(key) {
                return Err(SecretStoreError::DuplicateEntry(key.to_string()));
            }
            payload.entries.insert(key.to_string(), BASE64.encode(value));
            self.persist(&payload)
        })
    }

    fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SecretStoreError> {
        validate_key(key)?;
        self.locked(|| {
            let payload = self.load()?;
            match payload.entries.get(key) {
                Some(encoded) => {
                    let bytes = BASE64
                        .decode(encoded)
                        .map_err(|e| SecretStoreError::Corrupt(format!("base64 decode error: {}", e)))?;
                    Ok(Some(Zeroizing::new(bytes)))
                }
                None => Ok(None),
            }
        })
    }

    fn update(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        validate_key(key)?;
        self.locked(|| {
            let mut payload = self.load()?;
            payload.entries.insert(key.to_string(), BASE64.encode(value));
            self.persist(&payload)
        })
    }

    fn delete(&self, key: &str) -> Result<(), SecretStoreError> {
        validate_key(key)?;
        self.locked(|| {
            let mut payload = self.load()?;
            if payload.entries.remove(key).is_none() {
                return Ok(());
            }
            self.persist(&payload)
        })
    }

    fn delete_all(&self) -> Result<(), SecretStoreError> {
        self.locked(|| match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SecretStoreError::Unavailable(e.to_string())),
        })
    }
}
