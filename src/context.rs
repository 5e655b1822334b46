//! 프로세스 컨텍스트
//!
//! 시작 시 한 번 만들어 참조로 넘기는 명시적 핸들입니다 (전역 singleton 없음).
//! - 메인 앱: `SyncContext::open` (secret store + 공유 스토어 + Notion 클라이언트)
//! - 확장 프로세스: `SyncContext::open_reader` (캐시 읽기 전용, 시크릿/네트워크 없음)

use std::sync::Arc;

use crate::cache::snapshots::{self, RecentRecordsSnapshot, RefreshError};
use crate::cache::{CacheError, RecordFetcher, SharedCache};
use crate::config::SyncConfig;
use crate::credentials::{CredentialManager, CredentialValidator, ManagerOptions};
use crate::db::{SharedStore, SharedStoreError};
use crate::error::CredentialError;
use crate::notion::NotionClient;
use crate::secrets::{self, SecretStore, SecretStoreError};
use crate::settings::SettingsStore;

/// 컨텍스트 수준 오류
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Shared store error: {0}")]
    SharedStore(#[from] SharedStoreError),

    #[error("Secret store error: {0}")]
    SecretStore(#[from] SecretStoreError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),
}

/// 메인 앱 컨텍스트
pub struct SyncContext {
    config: SyncConfig,
    secrets: Arc<dyn SecretStore>,
    settings: SettingsStore,
    cache: SharedCache,
    fetcher: Arc<dyn RecordFetcher>,
    manager: CredentialManager,
}

impl SyncContext {
    /// 설정대로 모든 구성 요소 연결
    pub fn open(config: SyncConfig) -> Result<Self, SyncError> {
        let secrets = secrets::open_secret_store(&config)?;
        let notion = Arc::new(NotionClient::new());
        Self::open_with(config, secrets, notion.clone(), notion)
    }

    /// 저장소/외부 capability를 직접 주입 (테스트, 다른 호스트 앱)
    pub fn open_with(
        config: SyncConfig,
        secrets: Arc<dyn SecretStore>,
        validator: Arc<dyn CredentialValidator>,
        fetcher: Arc<dyn RecordFetcher>,
    ) -> Result<Self, SyncError> {
        let shared = Arc::new(SharedStore::open(&config.shared_store_path())?);
        let settings = SettingsStore::new(shared.clone());
        let cache = SharedCache::new(shared);
        let manager = CredentialManager::new(
            secrets.clone(),
            settings.clone(),
            validator,
            ManagerOptions::from(&config),
        );

        tracing::info!(
            container = %config.container_id,
            backend = ?config.secret_backend,
            "Sync context opened"
        );

        Ok(Self {
            config,
            secrets,
            settings,
            cache,
            fetcher,
            manager,
        })
    }

    /// 확장 프로세스용 캐시 전용 뷰
    pub fn open_reader(config: &SyncConfig) -> Result<ReaderContext, SyncError> {
        let shared = Arc::new(SharedStore::open(&config.shared_store_path())?);
        Ok(ReaderContext {
            cache: SharedCache::new(shared),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.manager
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// 토큰으로 데이터베이스 최근 레코드를 다시 가져와 캐시에 기록
    pub async fn refresh_recent_records(
        &self,
        credential_id: &str,
        source_id: &str,
    ) -> Result<RecentRecordsSnapshot, SyncError> {
        let secret = self.manager.secret_for(credential_id).await?;
        let snapshot = snapshots::refresh_recent_records(
            self.fetcher.as_ref(),
            &self.cache,
            &secret,
            source_id,
        )
        .await?;
        Ok(snapshot)
    }

    /// 모든 시크릿과 캐시 삭제 (전체 로그아웃 / 디버그 리셋).
    /// 마이그레이션 플래그는 유지하므로 레거시 데이터가 다시 들어오지 않습니다.
    pub async fn wipe_all(&self) -> Result<(), SyncError> {
        self.manager.clear_all().await?;
        self.secrets.delete_all()?;
        self.cache.clear_all()?;
        tracing::warn!("All credentials and cached snapshots wiped");
        Ok(())
    }
}

/// 확장 프로세스 컨텍스트 (읽기 전용)
#[derive(Clone)]
pub struct ReaderContext {
    cache: SharedCache,
}

impl ReaderContext {
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::snapshots::{
        load_recent_records, load_selected_sources, replace_selection, FetchError, RecordSource,
        RECENT_RECORDS_MAX_AGE, SELECTED_SOURCES_MAX_AGE,
    };
    use crate::config::SecretBackend;
    use crate::credentials::{ValidationFailure, WorkspaceInfo};
    use crate::notion::types::Page;
    use crate::secrets::InMemorySecretStore;
    use async_trait::async_trait;
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
            secret: &str,
            _source_id: &str,
            _limit: usize,
        ) -> Result<Vec<Page>, FetchError> {
            assert!(secret.starts_with("secret_"));
            Ok(vec![serde_json::from_value(serde_json::json!({
                "id": "p1",
                "last_edited_time": "2024-05-01T00:00:00.000Z",
                "properties": {"Name": {"type": "title", "title": [{"plain_text": "Hello"}]}}
            }))
            .unwrap()])
        }
    }

    fn config(dir: &std::path::Path) -> SyncConfig {
        SyncConfig {
            data_dir: dir.to_path_buf(),
            secret_backend: SecretBackend::Memory,
            ..SyncConfig::default()
        }
    }

    fn open(config: &SyncConfig) -> (SyncContext, Arc<InMemorySecretStore>) {
        let secrets = Arc::new(InMemorySecretStore::new());
        let offline = Arc::new(Offline);
        let context =
            SyncContext::open_with(config.clone(), secrets.clone(), offline.clone(), offline)
                .unwrap();
        (context, secrets)
    }

    #[tokio::test]
    async fn test_reader_sees_main_app_snapshots() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let (main_app, _) = open(&config);
        let reader = SyncContext::open_reader(&config).unwrap();

        let credential = main_app
            .credentials()
            .add("Work", &format!("secret_{}", "a".repeat(43)))
            .await
            .unwrap();
        replace_selection(
            main_app.cache(),
            &credential.id,
            vec![RecordSource {
                id: "db1".to_string(),
                name: "Roadmap".to_string(),
            }],
        )
        .unwrap();
        main_app
            .refresh_recent_records(&credential.id, "db1")
            .await
            .unwrap();

        let selection = load_selected_sources(reader.cache(), &credential.id, SELECTED_SOURCES_MAX_AGE);
        assert_eq!(selection.ready().unwrap().sources.len(), 1);
        let records = load_recent_records(reader.cache(), "db1", RECENT_RECORDS_MAX_AGE)
            .into_option()
            .unwrap();
        assert_eq!(records.records[0].title, "Hello");
    }

    #[tokio::test]
    async fn test_wipe_all() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let (context, secrets) = open(&config);

        context
            .credentials()
            .add("Work", &format!("ntn_{}", "b".repeat(46)))
            .await
            .unwrap();
        context
            .cache()
            .write("recent_records_db1", 1, &Vec::<String>::new())
            .unwrap();

        context.wipe_all().await.unwrap();

        assert!(secrets.is_empty());
        assert!(context.cache().keys().unwrap().is_empty());
        assert!(context.credentials().load().await.unwrap().is_empty());
        assert!(context.settings().migration_flag().unwrap());
    }

    #[tokio::test]
    async fn test_refresh_unknown_credential() {
        let dir = tempdir().unwrap();
        let (context, _) = open(&config(dir.path()));
        assert!(matches!(
            context.refresh_recent_records("missing", "db1").await,
            Err(SyncError::Credential(CredentialError::NotFound(_)))
        ));
    }
}
