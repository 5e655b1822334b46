//! 런타임 설정
//!
//! 기본값 위에 환경 변수(`NSC_*`)를 덮어씁니다.
//! 개발 환경에서는 `.env.local` / `.env`를 상위 디렉토리로 올라가며 찾아 로드합니다.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// 설정 오류
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Secret Store 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretBackend {
    Keyring,
    Vault,
    Memory,
}

impl FromStr for SecretBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" | "keychain" => Ok(SecretBackend::Keyring),
            "vault" | "file" => Ok(SecretBackend::Vault),
            "memory" => Ok(SecretBackend::Memory),
            _ => Err(()),
        }
    }
}

/// 프로세스 시작 시 1회 구성되는 설정
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 공유 컨테이너들의 상위 디렉토리
    pub data_dir: PathBuf,
    /// 메인 앱과 확장 프로세스가 공유하는 컨테이너 식별자
    pub container_id: String,
    /// Keychain 서비스 이름
    pub keychain_service: String,
    pub secret_backend: SecretBackend,
    /// 외부 검증 호출 타임아웃
    pub validation_timeout: Duration,
    /// validate_all 동시 실행 수
    pub validation_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir().join("notion-sync"),
            container_id: "group.com.notionsync.shared".to_string(),
            keychain_service: "com.notionsync.credentials".to_string(),
            secret_backend: SecretBackend::Keyring,
            validation_timeout: Duration::from_secs(10),
            validation_concurrency: 4,
        }
    }
}

impl SyncConfig {
    /// 환경 변수에서 설정 로드 (`.env.local` 우선)
    pub fn from_env() -> Result<Self, ConfigError> {
        load_env_for_dev();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정 구성 (테스트에서 환경 변수 대신 사용)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = non_empty(lookup("NSC_DATA_DIR")) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(id) = non_empty(lookup("NSC_CONTAINER_ID")) {
            config.container_id = id;
        }
        if let Some(service) = non_empty(lookup("NSC_KEYCHAIN_SERVICE")) {
            config.keychain_service = service;
        }
        if let Some(raw) = non_empty(lookup("NSC_SECRET_BACKEND")) {
            config.secret_backend = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "NSC_SECRET_BACKEND",
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = non_empty(lookup("NSC_VALIDATION_TIMEOUT_SECS")) {
            let secs = parse_positive("NSC_VALIDATION_TIMEOUT_SECS", &raw)?;
            config.validation_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(raw) = non_empty(lookup("NSC_VALIDATION_CONCURRENCY")) {
            config.validation_concurrency = parse_positive("NSC_VALIDATION_CONCURRENCY", &raw)?;
        }

        Ok(config)
    }

    /// 공유 컨테이너 디렉토리 (`<data_dir>/<container_id>`)
    pub fn container_dir(&self) -> PathBuf {
        self.data_dir.join(&self.container_id)
    }

    /// 공유 SQLite 파일 경로
    pub fn shared_store_path(&self) -> PathBuf {
        self.container_dir().join("shared.sqlite")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

fn find_upwards(start: PathBuf, filename: &str, max_hops: usize) -> Option<PathBuf> {
    let mut cur = start;
    for _ in 0..=max_hops {
        let candidate = cur.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        if !cur.pop() {
            break;
        }
    }
    None
}

/// 개발 환경용 `.env.local` / `.env` 로드. 파일이 없으면 무시.
fn load_env_for_dev() {
    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    for name in [".env.local", ".env"] {
        if let Some(path) = find_upwards(cwd.clone(), name, 6) {
            if load_env_file(&path) {
                return;
            }
        }
    }
}

fn load_env_file(path: &Path) -> bool {
    match dotenvy::from_path(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Loaded env file");
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to parse env file");
            false
        }
    }
}
