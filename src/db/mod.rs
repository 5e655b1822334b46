//! Shared Store Module
//!
//! 메인 앱과 확장 프로세스가 함께 여는 SQLite 파일.
//! 프로세스 간 동시성은 SQLite 파일 락(WAL + busy timeout)에 맡기고,
//! 엔트리는 항상 통째로 교체합니다 (부분 필드 read-modify-write 금지).

mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};

/// 다른 프로세스가 쓰기 중일 때 기다리는 최대 시간
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// 공유 스토어 오류
#[derive(Debug, thiserror::Error)]
pub enum SharedStoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shared store lock poisoned")]
    LockPoisoned,
}

/// 공유 key-value 스토어
pub struct SharedStore {
    conn: Mutex<Connection>,
}

impl SharedStore {
    /// 파일 기반 스토어 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self, SharedStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // journal_mode는 결과 row를 반환하므로 query_row로 실행
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::initialize(conn)
    }

    /// 메모리 스토어 (단일 프로세스 테스트용)
    pub fn open_in_memory() -> Result<Self, SharedStoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, SharedStoreError> {
        conn.execute_batch(schema::CREATE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SharedStoreError> {
        self.conn.lock().map_err(|_| SharedStoreError::LockPoisoned)
    }

    /// 엔트리 조회
    pub fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, SharedStoreError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                (namespace, key),
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 엔트리 전체 교체
    pub fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), SharedStoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_entries (namespace, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            (
                namespace,
                key,
                value,
                chrono::Utc::now().timestamp_millis(),
            ),
        )?;
        Ok(())
    }

    /// 엔트리 삭제. 삭제된 엔트리가 있었으면 true.
    pub fn remove(&self, namespace: &str, key: &str) -> Result<bool, SharedStoreError> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM kv_entries WHERE namespace = ?1 AND key = ?2",
            (namespace, key),
        )?;
        Ok(affected > 0)
    }

    /// namespace 전체 삭제
    pub fn clear_namespace(&self, namespace: &str) -> Result<usize, SharedStoreError> {
        let conn = self.conn()?;
        let affected = conn.execute("DELETE FROM kv_entries WHERE namespace = ?1", [namespace])?;
        Ok(affected)
    }

    /// namespace 내 키 목록 (정렬)
    pub fn keys(&self, namespace: &str) -> Result<Vec<String>, SharedStoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT key FROM kv_entries WHERE namespace = ?1 ORDER BY key")?;
        let iter = stmt.query_map([namespace], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for key in iter {
            keys.push(key?);
        }
        Ok(keys)
    }
}
