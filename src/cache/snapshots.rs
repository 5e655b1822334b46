//! 타입이 정해진 캐시 스냅샷
//!
//! - `selected_sources_<credential-id>`: 토큰별로 사용자가 고른 데이터베이스 목록
//! - `recent_records_<source-id>`: 데이터베이스별 최근 수정 레코드 요약
//!
//! 메인 앱만 `publish_*` / `refresh_*`를 호출하고, 확장 프로세스는 `load_*`만 호출합니다.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::shared_cache::{cache_key, CacheError, SharedCache};
use crate::credentials::validator::ValidationFailure;
use crate::notion::types::{Page, PropertyValue};

pub const SELECTED_SOURCES_PURPOSE: &str = "selected_sources";
pub const RECENT_RECORDS_PURPOSE: &str = "recent_records";

pub const SELECTED_SOURCES_SCHEMA_VERSION: u32 = 1;
pub const RECENT_RECORDS_SCHEMA_VERSION: u32 = 1;

/// 스냅샷 크기 상한
pub const MAX_SELECTED_SOURCES: usize = 20;
pub const MAX_RECENT_RECORDS: usize = 10;
pub const MAX_PROPERTIES_PER_RECORD: usize = 4;

/// 확장 프로세스가 기본으로 허용하는 나이
pub const SELECTED_SOURCES_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const RECENT_RECORDS_MAX_AGE: Duration = Duration::from_secs(30 * 60);

// =====================================
// 조회 결과
// =====================================

/// 읽는 쪽 결과: 신선한 값이 있거나, 정해진 placeholder 상태
#[derive(Debug, Clone, PartialEq)]
pub enum CachedView<T> {
    Ready(T),
    Placeholder,
}

impl<T> CachedView<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(value) => CachedView::Ready(value),
            None => CachedView::Placeholder,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, CachedView::Placeholder)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            CachedView::Ready(value) => Some(value),
            CachedView::Placeholder => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            CachedView::Ready(value) => Some(value),
            CachedView::Placeholder => None,
        }
    }
}

// =====================================
// 스냅샷 타입
// =====================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSource {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedSourcesSnapshot {
    pub credential_id: String,
    pub sources: Vec<RecordSource>,
}

impl SelectedSourcesSnapshot {
    /// 중복 id 제거 후 상한까지만 유지
    pub fn new(credential_id: impl Into<String>, sources: Vec<RecordSource>) -> Self {
        let mut seen = HashSet::new();
        let sources = sources
            .into_iter()
            .filter(|source| seen.insert(source.id.clone()))
            .take(MAX_SELECTED_SOURCES)
            .collect();
        Self {
            credential_id: credential_id.into(),
            sources,
        }
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.sources.iter().any(|s| s.id == source_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySummary {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub last_edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Vec<PropertySummary>,
}

impl RecordSummary {
    pub fn from_page(page: &Page) -> Self {
        let properties = page
            .properties
            .iter()
            .filter(|(_, value)| !matches!(value, PropertyValue::Title { .. }))
            .filter_map(|(name, value)| {
                value.display_text().map(|text| PropertySummary {
                    name: name.clone(),
                    text,
                })
            })
            .take(MAX_PROPERTIES_PER_RECORD)
            .collect();

        Self {
            id: page.id.clone(),
            title: page.title(),
            url: page.url.clone(),
            last_edited_at: page
                .last_edited_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
            properties,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentRecordsSnapshot {
    pub source_id: String,
    pub records: Vec<RecordSummary>,
}

impl RecentRecordsSnapshot {
    /// 최근 수정순 정렬 후 상한까지만 유지 (수정 시각이 없는 레코드는 뒤로)
    pub fn from_pages(source_id: impl Into<String>, pages: &[Page]) -> Self {
        let mut records: Vec<RecordSummary> = pages.iter().map(RecordSummary::from_page).collect();
        records.sort_by(|a, b| match (a.last_edited_at, b.last_edited_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        records.truncate(MAX_RECENT_RECORDS);

        Self {
            source_id: source_id.into(),
            records,
        }
    }
}

// =====================================
// 레코드 조회 capability
// =====================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Token rejected: {0}")]
    Unauthorized(String),

    #[error("Records unavailable: {0}")]
    Unavailable(String),
}

impl From<ValidationFailure> for FetchError {
    fn from(failure: ValidationFailure) -> Self {
        match failure {
            ValidationFailure::Invalid(detail) => FetchError::Unauthorized(detail),
            other => FetchError::Unavailable(other.to_string()),
        }
    }
}

/// 데이터베이스의 최근 수정 레코드 조회
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    async fn fetch_recent(
        &self,
        secret: &str,
        source_id: &str,
        limit: usize,
    ) -> Result<Vec<Page>, FetchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

// =====================================
// 선택된 데이터베이스
// =====================================

pub fn selected_sources_key(credential_id: &str) -> String {
    cache_key(SELECTED_SOURCES_PURPOSE, credential_id)
}

pub fn recent_records_key(source_id: &str) -> String {
    cache_key(RECENT_RECORDS_PURPOSE, source_id)
}

pub fn publish_selected_sources(
    cache: &SharedCache,
    snapshot: &SelectedSourcesSnapshot,
) -> Result<(), CacheError> {
    cache.write(
        &selected_sources_key(&snapshot.credential_id),
        SELECTED_SOURCES_SCHEMA_VERSION,
        snapshot,
    )
}

pub fn load_selected_sources(
    cache: &SharedCache,
    credential_id: &str,
    max_age: Duration,
) -> CachedView<SelectedSourcesSnapshot> {
    CachedView::from_option(cache.read(
        &selected_sources_key(credential_id),
        SELECTED_SOURCES_SCHEMA_VERSION,
        max_age,
    ))
}

/// 나이와 관계없이 마지막으로 기록된 선택 (메인 앱 내부용)
fn last_selection(cache: &SharedCache, credential_id: &str) -> Option<SelectedSourcesSnapshot> {
    cache.read(
        &selected_sources_key(credential_id),
        SELECTED_SOURCES_SCHEMA_VERSION,
        Duration::MAX,
    )
}

/// 선택 목록 교체. 빠진 데이터베이스의 최근 레코드 캐시는 함께 삭제합니다.
pub fn replace_selection(
    cache: &SharedCache,
    credential_id: &str,
    sources: Vec<RecordSource>,
) -> Result<SelectedSourcesSnapshot, CacheError> {
    let next = SelectedSourcesSnapshot::new(credential_id, sources);

    if let Some(previous) = last_selection(cache, credential_id) {
        for source in previous.sources.iter().filter(|s| !next.contains(&s.id)) {
            cache.clear(&recent_records_key(&source.id))?;
            tracing::debug!(source_id = %source.id, "Cleared records of deselected source");
        }
    }

    publish_selected_sources(cache, &next)?;
    Ok(next)
}

/// 데이터베이스 1개 선택 해제
pub fn deselect_source(
    cache: &SharedCache,
    credential_id: &str,
    source_id: &str,
) -> Result<(), CacheError> {
    let remaining = last_selection(cache, credential_id)
        .map(|snapshot| {
            snapshot
                .sources
                .into_iter()
                .filter(|s| s.id != source_id)
                .collect()
        })
        .unwrap_or_default();

    replace_selection(cache, credential_id, remaining)?;
    // 이전 선택이 없던 경우에도 남은 캐시는 정리
    cache.clear(&recent_records_key(source_id))
}

// =====================================
// 최근 레코드
// =====================================

pub fn publish_recent_records(
    cache: &SharedCache,
    snapshot: &RecentRecordsSnapshot,
) -> Result<(), CacheError> {
    cache.write(
        &recent_records_key(&snapshot.source_id),
        RECENT_RECORDS_SCHEMA_VERSION,
        snapshot,
    )
}

pub fn load_recent_records(
    cache: &SharedCache,
    source_id: &str,
    max_age: Duration,
) -> CachedView<RecentRecordsSnapshot> {
    CachedView::from_option(cache.read(
        &recent_records_key(source_id),
        RECENT_RECORDS_SCHEMA_VERSION,
        max_age,
    ))
}

/// 메인 앱 갱신 경로: 조회 → 요약 → 기록. 실패 시 기존 엔트리는 그대로 둡니다.
pub async fn refresh_recent_records(
    fetcher: &dyn RecordFetcher,
    cache: &SharedCache,
    secret: &str,
    source_id: &str,
) -> Result<RecentRecordsSnapshot, RefreshError> {
    let pages = fetcher
        .fetch_recent(secret, source_id, MAX_RECENT_RECORDS)
        .await?;
    let snapshot = RecentRecordsSnapshot::from_pages(source_id, &pages);
    publish_recent_records(cache, &snapshot)?;

    tracing::info!(
        source_id,
        records = snapshot.records.len(),
        "Recent records refreshed"
    );
    Ok(snapshot)
}
