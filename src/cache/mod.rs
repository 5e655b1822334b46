//! 프로세스 간 공유 캐시
//!
//! 메인 앱이 기록하고 확장 프로세스가 네트워크 없이 읽는 파생 데이터.

pub mod freshness;
pub mod shared_cache;
pub mod snapshots;

pub use freshness::Freshness;
pub use shared_cache::{CacheError, SharedCache};
pub use snapshots::{CachedView, RecordFetcher};
