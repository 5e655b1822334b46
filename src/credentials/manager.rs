//! Credential Lifecycle Manager
//!
//! - 컬렉션 전체가 저장 단위: "로드 → 메모리에서 변경 → 전체 쓰기"가 임계 구역
//! - 프로세스 내에서는 single-writer / many-reader (`RwLock<()>`)
//! - 저장소 I/O (keychain, SQLite, vault 파일)는 `spawn_blocking`에서 실행
//! - 마이그레이션은 첫 `load()` 또는 첫 변경 시 쓰기 락 안에서 1회 실행
//! - 외부 검증 호출은 락 밖에서 await (다른 add/delete를 막지 않음)
//! - 변경 성공 후 `CredentialEvent` 브로드캐스트

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::{broadcast, RwLock};
use zeroize::Zeroizing;

use crate::config::SyncConfig;
use crate::credentials::codec;
use crate::credentials::format;
use crate::credentials::migration::{self, MigrationOutcome};
use crate::credentials::model::{Credential, CredentialCollection};
use crate::credentials::validator::{CredentialValidator, ValidationFailure};
use crate::credentials::CREDENTIALS_KEY;
use crate::error::{CredentialError, CredentialResult};
use crate::secrets::SecretStore;
use crate::settings::SettingsStore;

/// 이름이 비어 있을 때 사용하는 표시 이름
const DEFAULT_DISPLAY_NAME: &str = "Notion";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 변경 알림 (프레젠테이션 어댑터가 구독)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialEvent {
    Added { id: String },
    Updated { id: String },
    Deleted { id: String },
    Validated { id: String },
    Migrated { imported: usize },
}

/// validate_all 항목별 결과
#[derive(Debug)]
pub struct ValidationReport {
    pub id: String,
    pub result: CredentialResult<Credential>,
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub validation_timeout: Duration,
    pub validation_concurrency: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            validation_timeout: Duration::from_secs(10),
            validation_concurrency: 4,
        }
    }
}

impl From<&SyncConfig> for ManagerOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            validation_timeout: config.validation_timeout,
            validation_concurrency: config.validation_concurrency.max(1),
        }
    }
}

pub struct CredentialManager {
    store: Arc<dyn SecretStore>,
    settings: SettingsStore,
    validator: Arc<dyn CredentialValidator>,
    options: ManagerOptions,
    /// 컬렉션 임계 구역. guard는 blocking 작업과 함께 이동
    lock: Arc<RwLock<()>>,
    /// 이 프로세스에서 마이그레이션 확인이 끝났는지
    migration_checked: AtomicBool,
    events: broadcast::Sender<CredentialEvent>,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn SecretStore>,
        settings: SettingsStore,
        validator: Arc<dyn CredentialValidator>,
        options: ManagerOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            settings,
            validator,
            options,
            lock: Arc::new(RwLock::new(())),
            migration_checked: AtomicBool::new(false),
            events,
        }
    }

    /// 변경 알림 구독
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CredentialEvent) {
        // 구독자가 없어도 무시
        let _ = self.events.send(event);
    }

    // =====================================
    // 임계 구역 (저장소 I/O는 blocking 스레드에서)
    // =====================================

    /// 읽기 락을 잡고 `f`를 blocking 스레드에서 실행
    async fn read_section<T, F>(&self, f: F) -> CredentialResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SecretStore) -> CredentialResult<T> + Send + 'static,
    {
        let guard = self.lock.clone().read_owned().await;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            f(store.as_ref())
        })
        .await
        .map_err(join_error)?
    }

    /// 쓰기 락을 잡고 (필요하면 마이그레이션 후) `f`를 blocking 스레드에서 실행.
    ///
    /// guard가 작업 안으로 이동하므로 호출자가 future를 drop해도
    /// 진행 중인 저장소 쓰기가 끝나기 전에는 다음 writer가 들어오지 않습니다.
    async fn write_section<T, F>(&self, f: F) -> CredentialResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SecretStore) -> CredentialResult<T> + Send + 'static,
    {
        let guard = self.lock.clone().write_owned().await;
        let migrate = !self.migration_checked.load(Ordering::Acquire);
        let store = self.store.clone();
        let settings = self.settings.clone();

        let (migrated, result) = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let migrated = if migrate {
                match migration::run_migration(store.as_ref(), &settings) {
                    Ok(outcome) => Some(outcome),
                    Err(e) => return (None, Err(e)),
                }
            } else {
                None
            };
            (migrated, f(store.as_ref()))
        })
        .await
        .map_err(join_error)?;

        if let Some(outcome) = migrated {
            self.migration_checked.store(true, Ordering::Release);
            if let MigrationOutcome::Migrated { imported, .. } = outcome {
                if imported > 0 {
                    self.emit(CredentialEvent::Migrated { imported });
                }
            }
        }
        result
    }

    async fn ensure_migrated(&self) -> CredentialResult<()> {
        if self.migration_checked.load(Ordering::Acquire) {
            return Ok(());
        }
        self.write_section(|_| Ok(())).await
    }

    // =====================================
    // 공개 API
    // =====================================

    /// 현재 컬렉션. 손상된 데이터는 빈 컬렉션으로 대체하지 않고 `CorruptPayload`로 반환.
    pub async fn load(&self) -> CredentialResult<CredentialCollection> {
        self.ensure_migrated().await?;
        self.read_section(read_collection).await
    }

    pub async fn get(&self, id: &str) -> CredentialResult<Credential> {
        self.load()
            .await?
            .get(id)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(id.to_string()))
    }

    /// 외부 호출에 넘길 토큰 값 (drop 시 zeroize)
    pub async fn secret_for(&self, id: &str) -> CredentialResult<Zeroizing<String>> {
        self.ensure_migrated().await?;

        let target = id.to_string();
        self.read_section(move |store| {
            let collection = read_collection(store)?;
            let credential = collection
                .get(&target)
                .ok_or_else(|| CredentialError::NotFound(target.clone()))?;
            Ok(Zeroizing::new(credential.secret_value.clone()))
        })
        .await
    }

    /// 새 토큰 등록. 형식 검사는 저장소에 닿기 전에 수행.
    pub async fn add(&self, display_name: &str, secret: &str) -> CredentialResult<Credential> {
        format::validate_token(secret)?;

        let credential = Credential::new(normalize_name(display_name), secret);
        let pending = credential.clone();
        self.write_section(move |store| {
            let mut collection = read_collection(store)?;
            if collection.contains_secret(&pending.secret_value) {
                return Err(CredentialError::DuplicateSecret);
            }
            collection.push(pending);
            write_collection(store, &collection)
        })
        .await?;

        tracing::info!(id = %credential.id, "Credential added");
        self.emit(CredentialEvent::Added {
            id: credential.id.clone(),
        });
        Ok(credential)
    }

    /// 표시 이름 변경
    pub async fn update(&self, id: &str, display_name: &str) -> CredentialResult<Credential> {
        let target = id.to_string();
        let name = normalize_name(display_name);
        let updated = self
            .write_section(move |store| {
                let mut collection = read_collection(store)?;
                let credential = collection
                    .get_mut(&target)
                    .ok_or_else(|| CredentialError::NotFound(target.clone()))?;
                credential.display_name = name;
                let updated = credential.clone();
                write_collection(store, &collection)?;
                Ok(updated)
            })
            .await?;

        self.emit(CredentialEvent::Updated { id: id.to_string() });
        Ok(updated)
    }

    /// 삭제. 없는 id도 성공 (컬렉션은 그대로).
    pub async fn delete(&self, id: &str) -> CredentialResult<()> {
        let target = id.to_string();
        let removed = self
            .write_section(move |store| {
                let mut collection = read_collection(store)?;
                if collection.remove(&target).is_none() {
                    return Ok(false);
                }
                write_collection(store, &collection)?;
                Ok(true)
            })
            .await?;

        if !removed {
            tracing::debug!(id, "Delete of unknown credential ignored");
            return Ok(());
        }
        tracing::info!(id, "Credential deleted");
        self.emit(CredentialEvent::Deleted { id: id.to_string() });
        Ok(())
    }

    /// 컬렉션 전체 삭제. 손상된 데이터도 지울 수 있어야 하므로 해석 실패는 무시합니다.
    pub async fn clear_all(&self) -> CredentialResult<usize> {
        let ids = self
            .write_section(|store| {
                let ids: Vec<String> = match read_collection(store) {
                    Ok(collection) => collection.iter().map(|c| c.id.clone()).collect(),
                    Err(CredentialError::CorruptPayload(detail)) => {
                        tracing::warn!(detail = %detail, "Clearing unreadable credential payload");
                        Vec::new()
                    }
                    Err(e) => return Err(e),
                };
                store.delete(CREDENTIALS_KEY)?;
                Ok(ids)
            })
            .await?;

        tracing::info!(removed = ids.len(), "All credentials cleared");
        for id in &ids {
            self.emit(CredentialEvent::Deleted { id: id.clone() });
        }
        Ok(ids.len())
    }

    /// 외부 검증기로 토큰 검증.
    ///
    /// 실패(거부/네트워크/rate limit/타임아웃)는 저장 상태를 바꾸지 않습니다.
    /// 호출자가 future를 drop하면 아무것도 쓰이지 않습니다.
    pub async fn validate(&self, id: &str) -> CredentialResult<Credential> {
        let secret = self.secret_for(id).await?;

        // 락 없이 네트워크 대기
        let info = match tokio::time::timeout(
            self.options.validation_timeout,
            self.validator.validate(&secret),
        )
        .await
        {
            Ok(Ok(info)) => info,
            Ok(Err(failure)) => {
                tracing::info!(id, error = %failure, "Credential validation failed");
                return Err(map_validation_failure(failure));
            }
            Err(_) => {
                tracing::warn!(id, "Credential validation timed out");
                return Err(CredentialError::ValidationUnavailable(format!(
                    "timed out after {}s",
                    self.options.validation_timeout.as_secs_f32()
                )));
            }
        };

        let target = id.to_string();
        let validated = self
            .write_section(move |store| {
                let mut collection = read_collection(store)?;
                // 검증 중에 삭제되었을 수 있음
                let credential = collection
                    .get_mut(&target)
                    .ok_or_else(|| CredentialError::NotFound(target.clone()))?;
                credential.is_valid = true;
                credential.workspace_label = info.label;
                credential.workspace_icon = info.icon;
                credential.last_validated_at = Some(chrono::Utc::now());
                let validated = credential.clone();
                write_collection(store, &collection)?;
                Ok(validated)
            })
            .await?;

        self.emit(CredentialEvent::Validated { id: id.to_string() });
        Ok(validated)
    }

    /// 모든 토큰 검증. 항목별 실패는 배치를 중단시키지 않으며 결과는 컬렉션 순서.
    pub async fn validate_all(&self) -> CredentialResult<Vec<ValidationReport>> {
        let ids: Vec<String> = self.load().await?.iter().map(|c| c.id.clone()).collect();

        let reports = stream::iter(ids)
            .map(|id| async move {
                let result = self.validate(&id).await;
                ValidationReport { id, result }
            })
            .buffered(self.options.validation_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let failed = reports.iter().filter(|r| r.result.is_err()).count();
        tracing::info!(total = reports.len(), failed, "Bulk validation finished");
        Ok(reports)
    }
}

// =====================================
// 저장소 접근 (blocking 스레드, 락 보유 상태)
// =====================================

fn read_collection(store: &dyn SecretStore) -> CredentialResult<CredentialCollection> {
    match store.retrieve(CREDENTIALS_KEY)? {
        Some(bytes) => codec::decode(&bytes),
        None => Ok(CredentialCollection::new()),
    }
}

fn write_collection(
    store: &dyn SecretStore,
    collection: &CredentialCollection,
) -> CredentialResult<()> {
    let bytes = Zeroizing::new(codec::encode(collection)?);
    store.update(CREDENTIALS_KEY, &bytes)?;
    Ok(())
}

fn join_error(err: tokio::task::JoinError) -> CredentialError {
    CredentialError::StoreUnavailable(format!("secret store task failed: {}", err))
}

fn normalize_name(display_name: &str) -> String {
    let trimmed = display_name.trim();
    if trimmed.is_empty() {
        DEFAULT_DISPLAY_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn map_validation_failure(failure: ValidationFailure) -> CredentialError {
    match failure {
        ValidationFailure::Invalid(message) => CredentialError::ValidationRejected(message),
        ValidationFailure::Network(message) => CredentialError::ValidationUnavailable(message),
        ValidationFailure::RateLimited { retry_after } => {
            CredentialError::ValidationUnavailable(match retry_after {
                Some(wait) => format!("rate limited, retry after {}s", wait.as_secs()),
                None => "rate limited".to_string(),
            })
        }
    }
}
