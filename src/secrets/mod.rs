//! Secret Store 모듈
//!
//! 하나의 서비스 이름(scope)에 묶인 시크릿 저장소에 대한 원자적 CRUD.
//!
//! - `KeyringSecretStore`: OS Keychain/Keyring (기본)
//! - `VaultSecretStore`: Keychain을 쓸 수 없는 환경용 AEAD 암호화 파일
//! - `InMemorySecretStore`: 테스트/임시 실행용
//!
//! 어댑터는 호출 단위의 원자성만 보장하고, 프로세스 간 상호 배제는 제공하지 않습니다.
//! 페이로드 내용은 절대 로그에 남기지 않습니다.

pub mod keyring_store;
pub mod master_key;
pub mod memory_store;
pub mod vault;

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::config::{SecretBackend, SyncConfig};

pub use keyring_store::KeyringSecretStore;
pub use master_key::MasterKey;
pub use memory_store::InMemorySecretStore;
pub use vault::VaultSecretStore;

/// Secret Store 오류
#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("Secret entry already exists: {0}")]
    DuplicateEntry(String),

    #[error("Secret store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid secret key")]
    InvalidKey,

    #[error("Stored secret is unreadable: {0}")]
    Corrupt(String),
}

/// 시크릿 저장소 어댑터
///
/// 모든 호출은 여러 스레드에서 외부 락 없이 안전하게 호출할 수 있어야 합니다.
pub trait SecretStore: Send + Sync {
    /// 새 엔트리 저장. 키가 이미 있으면 `DuplicateEntry`.
    fn store(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError>;

    /// 엔트리 조회. 없으면 `Ok(None)`.
    fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SecretStoreError>;

    /// create-or-replace
    fn update(&self, key: &str, value: &[u8]) -> Result<(), SecretStoreError>;

    /// 엔트리 삭제. 없는 키도 성공.
    fn delete(&self, key: &str) -> Result<(), SecretStoreError>;

    fn exists(&self, key: &str) -> Result<bool, SecretStoreError> {
        Ok(self.retrieve(key)?.is_some())
    }

    /// scope 내 모든 엔트리 삭제
    fn delete_all(&self) -> Result<(), SecretStoreError>;
}

/// 설정에 따라 백엔드 선택
pub fn open_secret_store(config: &SyncConfig) -> Result<Arc<dyn SecretStore>, SecretStoreError> {
    match config.secret_backend {
        SecretBackend::Keyring => Ok(Arc::new(KeyringSecretStore::new(
            &config.keychain_service,
        ))),
        SecretBackend::Vault => {
            let master_key = MasterKey::load_or_create(&config.keychain_service)?;
            let path = vault::get_vault_path(&config.container_dir());
            Ok(Arc::new(VaultSecretStore::new(path, master_key)))
        }
        SecretBackend::Memory => Ok(Arc::new(InMemorySecretStore::default())),
    }
}

/// 키 검증 (보수적인 문자 집합)
pub(crate) fn validate_key(key: &str) -> Result<(), SecretStoreError> {
    let ok = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(SecretStoreError::InvalidKey)
    }
}
