//! Notion Sync Core
//!
//! Notion 통합 토큰 보안 저장소와 프로세스 간 공유 캐시를 담당하는 라이브러리입니다.
//! 메인 앱과 확장 프로세스가 같은 공유 컨테이너를 열어 사용합니다.

pub mod cache;
pub mod config;
pub mod context;
pub mod credentials;
pub mod db;
pub mod error;
pub mod logging;
pub mod notion;
pub mod secrets;
pub mod settings;

pub use config::SyncConfig;
pub use context::{ReaderContext, SyncContext, SyncError};
pub use error::{CredentialError, CredentialResult, ErrorReport};
pub use logging::init_logging;
