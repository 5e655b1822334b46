//! OS Keychain/Keyring 기반 Secret Store
//!
//! - 값은 base64 문자열로 저장
//! - Keychain은 서비스 단위 열거가 불가능하므로, 이 스토어가 쓴 키 목록을
//!   별도 인덱스 엔트리(`nsc.key_index`)에 보관하여 `delete_all`에 사용

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use keyring::{Entry, Error as KeyringError};
use std::collections::BTreeSet;
use std::sync::Mutex;
use zeroize::Zeroizing;

use crate::secrets::{validate_key, SecretStore, SecretStoreError};

/// 키 인덱스 엔트리
const KEY_INDEX: &str = "nsc.key_index";

#[derive(Debug)]
pub struct KeyringSecretStore {
    service: String,
    /// 인덱스 read-modify-write 직렬화
    index_lock: Mutex<()>,
}

fn map_keyring_error(err: KeyringError) -> SecretStoreError {
    match err {
        KeyringError::BadEncoding(_) => {
            SecretStoreError::Corrupt("keychain value is not valid UTF-8".to_string())
        }
        KeyringError::Invalid(_, _) | KeyringError::TooLong(_, _) => SecretStoreError::InvalidKey,
        other => SecretStoreError::Unavailable(format!("keychain error: {}", other)),
    }
}

impl KeyringSecretStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<Entry, SecretStoreError> {
        Entry::new(&self.service, key).map_err(map_keyring_error)
    }

    fn read_raw(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(KeyringError::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn write_raw(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        let encoded = Zeroizing::new(BASE64.encode(value));
        self.entry(key)?
            .set_password(&encoded)
            .map_err(map_keyring_error)
    }

    fn remove_raw(&self, key: &str) -> Result<(), SecretStoreError> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn read_index(&self) -> Result<BTreeSet<String>, SecretStoreError> {
        match self.read_raw(KEY_INDEX)? {
            Some(raw) => {
                let bytes = BASE64
                    .decode(raw)
                    .map_err(|e| SecretStoreError::Corrupt(format!("key index: {}", e)))?;
                serde_json::from_slice(&bytes)
                    .map_err(|e| SecretStoreError::Corrupt(format!("key index: {}", e)))
            }
            None => Ok(BTreeSet::new()),
        }
    }

    fn lock_index(&self) -> Result<std::sync::MutexGuard<'_, ()>, SecretStoreError> {
        self.index_lock
            .lock()
            .map_err(|e| SecretStoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    /// `index_lock`을 잡은 상태에서 호출
    fn modify_index_locked(
        &self,
        f: impl FnOnce(&mut BTreeSet<String>) -> bool,
    ) -> Result<(), SecretStoreError> {
        let mut index = recover_index(self.read_index())?;
        if !f(&mut index) {
            return Ok(());
        }
        let bytes = serde_json::to_vec(&index)
            .map_err(|e| SecretStoreError::Unavailable(format!("key index: {}", e)))?;
        self.write_raw(KEY_INDEX, &bytes)
    }
}

/// 깨진 인덱스만 새로 시작한다. 일시적 오류로 인덱스를 덮어쓰면 기존 키를 잃는다.
fn recover_index(
    read: Result<BTreeSet<String>, SecretStoreError>,
) -> Result<BTreeSet<String>, SecretStoreError> {
    match read {
        Err(SecretStoreError::Corrupt(detail)) => {
            tracing::warn!(detail = %detail, "Keychain key index unreadable, starting a new one");
            Ok(BTreeSet::new())
        }
        other => other,
    }
}

/// 값 변경이 커밋되면 호출은 성공. 인덱스 갱신 실패는 경고만 남긴다.
fn commit_then_index(
    key: &str,
    value_change: Result<(), SecretStoreError>,
    index_change: impl FnOnce() -> Result<(), SecretStoreError>,
) -> Result<(), SecretStoreError> {
    value_change?;
    if let Err(e) = index_change() {
        tracing::warn!(key, error = %e, "Keychain key index not updated");
    }
    Ok(())
}

impl SecretStore for KeyringSecretStore {
    /// 존재 확인과 쓰기는 `index_lock` 안에서 수행합니다.
    /// Keychain에는 compare-and-set이 없으므로 프로세스 간 경합은 막을 수 없습니다.
    fn store(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        validate_key(key)?;
        let _guard = self.lock_index()?;
        if self.read_raw(key)?.is_some() {
            return Err(SecretStoreError::DuplicateEntry(key.to_string()));
        }
        commit_then_index(key, self.write_raw(key, value), || {
            self.modify_index_locked(|index| index.insert(key.to_string()))
        })
    }

    fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SecretStoreError> {
        validate_key(key)?;
        match self.read_raw(key)? {
            Some(raw) => {
                let raw = Zeroizing::new(raw);
                let bytes = BASE64
                    .decode(raw.as_bytes())
                    .map_err(|e| SecretStoreError::Corrupt(format!("base64 decode error: {}", e)))?;
                Ok(Some(Zeroizing::new(bytes)))
            }
            None => Ok(None),
        }
    }

    fn update(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        validate_key(key)?;
        let _guard = self.lock_index()?;
        commit_then_index(key, self.write_raw(key, value), || {
            self.modify_index_locked(|index| index.insert(key.to_string()))
        })
    }

    fn delete(&self, key: &str) -> Result<(), SecretStoreError> {
        validate_key(key)?;
        let _guard = self.lock_index()?;
        commit_then_index(key, self.remove_raw(key), || {
            self.modify_index_locked(|index| index.remove(key))
        })
    }

    fn delete_all(&self) -> Result<(), SecretStoreError> {
        let _guard = self.lock_index()?;

        // 일시적 오류면 인덱스를 지우지 않고 실패를 돌려준다
        let index = recover_index(self.read_index())?;
        for key in &index {
            self.remove_raw(key)?;
        }
        self.remove_raw(KEY_INDEX)?;
        tracing::info!(service = %self.service, count = index.len(), "Keychain scope cleared");
        Ok(())
    }
}
