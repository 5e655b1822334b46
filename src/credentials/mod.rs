//! Notion 통합 토큰 관리
//!
//! - `model`: Credential / CredentialCollection
//! - `format`: 토큰 형식 검사
//! - `codec`: 컬렉션 ⇄ 바이트 (현재 포맷 + 레거시 포맷)
//! - `migration`: 레거시 평문 저장소 → Secret Store 1회성 이전
//! - `manager`: 수명 주기 (load/add/update/delete/validate)
//! - `validator`: 외부 검증기 인터페이스

pub mod codec;
pub mod format;
pub mod manager;
pub mod migration;
pub mod model;
pub mod validator;

/// Secret Store 안에서 컬렉션 전체가 저장되는 키
pub const CREDENTIALS_KEY: &str = "notion_credentials";

pub use manager::{CredentialEvent, CredentialManager, ManagerOptions, ValidationReport};
pub use migration::MigrationOutcome;
pub use model::{Credential, CredentialCollection};
pub use validator::{CredentialValidator, ValidationFailure, WorkspaceInfo};
