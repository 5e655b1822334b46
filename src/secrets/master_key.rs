//! Vault 마스터키 관리
//!
//! - 마스터키는 Keychain에 1개만 저장 (`nsc:master_key_v1`)
//! - 없으면 CSPRNG로 생성 후 저장
//! - 메모리에서는 drop 시 zeroize

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use keyring::Entry;
use rand::Rng;
use zeroize::{Zeroize, Zeroizing};

use crate::secrets::vault::MASTER_KEY_LEN;
use crate::secrets::SecretStoreError;

/// 마스터키 Keychain 키
const MASTER_KEY_KEYCHAIN_KEY: &str = "nsc:master_key_v1";

/// 마스터키를 보관하는 Keychain 엔트리
trait KeySlot {
    fn get(&self) -> Result<Option<Zeroizing<String>>, SecretStoreError>;
    fn set(&self, encoded: &str) -> Result<(), SecretStoreError>;
}

impl KeySlot for Entry {
    fn get(&self) -> Result<Option<Zeroizing<String>>, SecretStoreError> {
        match self.get_password() {
            Ok(encoded) => Ok(Some(Zeroizing::new(encoded))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SecretStoreError::Unavailable(format!(
                "keychain get error: {}",
                e
            ))),
        }
    }

    fn set(&self, encoded: &str) -> Result<(), SecretStoreError> {
        self.set_password(encoded)
            .map_err(|e| SecretStoreError::Unavailable(format!("keychain set error: {}", e)))
    }
}

/// Zeroize가 적용된 마스터키 래퍼
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// 마스터키 생성 (CSPRNG)
    pub fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        rand::thread_rng().fill(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.bytes
    }

    /// Keychain에서 마스터키 로드, 없으면 생성하고 저장
    pub fn load_or_create(service: &str) -> Result<Self, SecretStoreError> {
        let entry = Entry::new(service, MASTER_KEY_KEYCHAIN_KEY)
            .map_err(|e| SecretStoreError::Unavailable(format!("keychain entry error: {}", e)))?;
        Self::load_or_create_in(&entry)
    }

    fn load_or_create_in(slot: &impl KeySlot) -> Result<Self, SecretStoreError> {
        if let Some(encoded) = slot.get()? {
            return Self::decode(&encoded);
        }

        tracing::info!("No vault master key found, generating new one");
        slot.set(&Zeroizing::new(Self::generate().encode()))?;

        // 여러 프로세스가 동시에 처음 실행되면 마지막에 저장된 키를 모두 사용
        match slot.get()? {
            Some(encoded) => Self::decode(&encoded),
            None => Err(SecretStoreError::Unavailable(
                "master key missing right after write".to_string(),
            )),
        }
    }

    fn encode(&self) -> String {
        BASE64.encode(self.bytes)
    }

    fn decode(encoded: &str) -> Result<Self, SecretStoreError> {
        let mut raw = BASE64
            .decode(encoded)
            .map_err(|_| SecretStoreError::Corrupt("invalid master key encoding".to_string()))?;

        if raw.len() != MASTER_KEY_LEN {
            raw.zeroize();
            return Err(SecretStoreError::Corrupt(
                "invalid master key length".to_string(),
            ));
        }

        let mut bytes = [0u8; MASTER_KEY_LEN];
        bytes.copy_from_slice(&raw);
        raw.zeroize();
        Ok(Self { bytes })
    }
}
