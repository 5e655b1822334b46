//! 레거시 평문 저장소 → Secret Store 마이그레이션 시나리오 (공개 API만 사용)

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use nsc_lib::cache::snapshots::{FetchError, RecordFetcher};
use nsc_lib::config::SecretBackend;
use nsc_lib::credentials::codec::{self, LegacyCredential};
use nsc_lib::credentials::{
    CredentialCollection, CredentialEvent, CredentialValidator, ValidationFailure, WorkspaceInfo,
    CREDENTIALS_KEY,
};
use nsc_lib::notion::types::Page;
use nsc_lib::secrets::{InMemorySecretStore, SecretStore};
use nsc_lib::{SyncConfig, SyncContext};
use tempfile::tempdir;

struct Offline;

#[async_trait]
impl CredentialValidator for Offline {
    async fn validate(&self, _secret: &str) -> Result<WorkspaceInfo, ValidationFailure> {
        Err(ValidationFailure::Network("offline".to_string()))
    }
}

#[async_trait]
impl RecordFetcher for Offline {
    async fn fetch_recent(
        &self,
        _secret: &str,
        _source_id: &str,
        _limit: usize,
    ) -> Result<Vec<Page>, FetchError> {
        Err(FetchError::Unavailable("offline".to_string()))
    }
}

fn config(dir: &Path) -> SyncConfig {
    SyncConfig {
        data_dir: dir.to_path_buf(),
        secret_backend: SecretBackend::Memory,
        ..SyncConfig::default()
    }
}

/// 같은 공유 컨테이너 + 같은 secret store로 프로세스를 (재)시작
fn launch(config: &SyncConfig, secrets: &Arc<InMemorySecretStore>) -> SyncContext {
    let offline = Arc::new(Offline);
    SyncContext::open_with(config.clone(), secrets.clone(), offline.clone(), offline).unwrap()
}

fn legacy_item(id: &str, name: &str, token: String) -> LegacyCredential {
    LegacyCredential {
        id: id.to_string(),
        name: name.to_string(),
        token,
        workspace_name: Some("Acme".to_string()),
        workspace_icon: None,
        is_valid: true,
        created_at: Some(1_700_000_000_000),
        last_validated: Some(1_700_000_500_000),
    }
}

fn two_legacy_items() -> Vec<LegacyCredential> {
    vec![
        legacy_item("legacy-a", "A", format!("secret_{}", "A1".repeat(21) + "x")),
        legacy_item("legacy-b", "B", format!("ntn_{}", "b2".repeat(23))),
    ]
}

#[tokio::test]
async fn test_legacy_credentials_migrate_once() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let secrets = Arc::new(InMemorySecretStore::new());
    let context = launch(&config, &secrets);

    context
        .settings()
        .write_legacy_tokens_raw(&codec::encode_legacy(&two_legacy_items()).unwrap())
        .unwrap();
    let mut events = context.credentials().subscribe();

    let first = context.credentials().load().await.unwrap();
    let names: Vec<_> = first.iter().map(|c| c.display_name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(first.iter().all(|c| c.is_valid));
    assert_eq!(first.get("legacy-a").unwrap().created_at.timestamp_millis(), 1_700_000_000_000);

    assert!(context.settings().legacy_tokens_raw().unwrap().is_none());
    assert!(context.settings().migration_flag().unwrap());
    assert_eq!(
        events.try_recv().unwrap(),
        CredentialEvent::Migrated { imported: 2 }
    );

    let second = context.credentials().load().await.unwrap();
    assert_eq!(second, first);

    // 재시작 후에도 중복 없음
    let relaunched = launch(&config, &secrets);
    assert_eq!(relaunched.credentials().load().await.unwrap(), first);
}

#[tokio::test]
async fn test_retry_after_crash_before_flag() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let secrets = Arc::new(InMemorySecretStore::new());
    let items = two_legacy_items();

    // 이전 실행이 컬렉션 쓰기까지만 하고 종료된 상태
    let written = CredentialCollection::from_vec(
        items.iter().cloned().map(LegacyCredential::into_credential).collect(),
    );
    secrets
        .update(CREDENTIALS_KEY, &codec::encode(&written).unwrap())
        .unwrap();

    let context = launch(&config, &secrets);
    context
        .settings()
        .write_legacy_tokens_raw(&codec::encode_legacy(&items).unwrap())
        .unwrap();
    assert!(!context.settings().migration_flag().unwrap());

    let loaded = context.credentials().load().await.unwrap();
    assert_eq!(loaded, written);
    assert!(context.settings().legacy_tokens_raw().unwrap().is_none());
    assert!(context.settings().migration_flag().unwrap());
}

#[tokio::test]
async fn test_flag_set_ignores_new_legacy_data() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let secrets = Arc::new(InMemorySecretStore::new());

    let context = launch(&config, &secrets);
    context.settings().set_migration_flag().unwrap();
    // 구버전 앱이 나중에 다시 평문으로 기록한 경우
    context
        .settings()
        .write_legacy_tokens_raw(&codec::encode_legacy(&two_legacy_items()).unwrap())
        .unwrap();

    assert!(context.credentials().load().await.unwrap().is_empty());
    assert!(context.settings().legacy_tokens_raw().unwrap().is_none());
}

#[tokio::test]
async fn test_first_mutation_triggers_migration() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let secrets = Arc::new(InMemorySecretStore::new());
    let context = launch(&config, &secrets);
    context
        .settings()
        .write_legacy_tokens_raw(&codec::encode_legacy(&two_legacy_items()).unwrap())
        .unwrap();

    let added = context
        .credentials()
        .add("New", &format!("secret_{}", "n".repeat(43)))
        .await
        .unwrap();

    let collection = context.credentials().load().await.unwrap();
    assert_eq!(collection.len(), 3);
    assert_eq!(collection.iter().last().unwrap().id, added.id);

    // 레거시와 같은 토큰은 다시 추가할 수 없음
    let err = context
        .credentials()
        .add("Again", &two_legacy_items()[1].token)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_SECRET");
}

#[tokio::test]
async fn test_developer_reset_reimports() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let secrets = Arc::new(InMemorySecretStore::new());
    let context = launch(&config, &secrets);

    context.credentials().load().await.unwrap();
    context.settings().reset_migration_flag().unwrap();
    context
        .settings()
        .write_legacy_tokens_raw(&codec::encode_legacy(&two_legacy_items()).unwrap())
        .unwrap();

    // 새 프로세스에서 다시 마이그레이션
    let relaunched = launch(&config, &secrets);
    assert_eq!(relaunched.credentials().load().await.unwrap().len(), 2);
}
