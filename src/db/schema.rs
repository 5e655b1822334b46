//! Shared Store Schema
//!
//! 공유 컨테이너 SQLite 테이블 스키마 정의

/// 공유 스토어 스키마 생성 SQL
pub const CREATE_SCHEMA: &str = r#"
-- namespace별 key-value 엔트리 (항상 엔트리 단위로 교체)
CREATE TABLE IF NOT EXISTS kv_entries (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value BLOB NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (namespace, key)
);

CREATE INDEX IF NOT EXISTS idx_kv_entries_namespace ON kv_entries(namespace);
"#;
