//! 레거시 평문 저장소 → Secret Store 1회성 마이그레이션
//!
//! 순서:
//! 1. 플래그가 true면 가져오기 생략 (남은 레거시 데이터만 멱등 삭제)
//! 2. 레거시 데이터가 없으면 플래그만 설정
//! 3. 레거시 항목을 id 기준으로 병합하여 컬렉션 전체를 `update`(upsert)
//! 4. 3이 완전히 성공한 뒤에만 플래그 설정 → 레거시 삭제
//!
//! 삭제가 플래그보다 먼저 일어나면 다음 실행에서 "가져올 것 없음"으로 보이고
//! 데이터가 사라지므로, 반드시 플래그 → 삭제 순서를 지킵니다.
//! 3과 4 사이에서 프로세스가 죽으면 플래그는 false로 남고, 재실행은 upsert라 안전합니다.

use crate::credentials::codec::{self, LegacyCredential};
use crate::credentials::format;
use crate::credentials::model::CredentialCollection;
use crate::credentials::CREDENTIALS_KEY;
use crate::error::{CredentialError, CredentialResult};
use crate::secrets::SecretStore;
use crate::settings::{SettingsError, SettingsStore};

/// 마이그레이션 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationOutcome {
    AlreadyMigrated,
    NothingToMigrate,
    Migrated { imported: usize, skipped: usize },
}

fn settings_error(err: SettingsError) -> CredentialError {
    CredentialError::StoreUnavailable(err.to_string())
}

/// 전체 마이그레이션 (호출자가 쓰기 락을 잡고 있어야 함)
pub(crate) fn run_migration(
    store: &dyn SecretStore,
    settings: &SettingsStore,
) -> CredentialResult<MigrationOutcome> {
    if settings.migration_flag().map_err(settings_error)? {
        // 이전 실행에서 플래그만 설정되고 삭제가 실패했을 수 있음
        erase_legacy(settings);
        return Ok(MigrationOutcome::AlreadyMigrated);
    }

    let legacy = match settings.legacy_tokens_raw().map_err(settings_error)? {
        Some(bytes) => codec::decode_legacy(&bytes)?,
        None => Vec::new(),
    };

    if legacy.is_empty() {
        settings.set_migration_flag().map_err(settings_error)?;
        erase_legacy(settings);
        tracing::info!("No legacy tokens found, migration marked complete");
        return Ok(MigrationOutcome::NothingToMigrate);
    }

    let (imported, skipped) = import_legacy(store, legacy)?;

    // 여기까지 모두 성공한 경우에만 플래그 → 삭제
    settings.set_migration_flag().map_err(settings_error)?;
    erase_legacy(settings);

    tracing::info!(imported, skipped, "Legacy tokens migrated to secret store");
    Ok(MigrationOutcome::Migrated { imported, skipped })
}

/// 3단계: 레거시 항목을 저장된 컬렉션에 병합하고 전체를 upsert.
///
/// 반환값: (가져온 수, 건너뛴 수). 같은 id가 이미 있으면 이미 가져온 것으로 보고 건너뜁니다.
pub(crate) fn import_legacy(
    store: &dyn SecretStore,
    legacy: Vec<LegacyCredential>,
) -> CredentialResult<(usize, usize)> {
    let mut collection = match store.retrieve(CREDENTIALS_KEY)? {
        Some(bytes) => codec::decode(&bytes)?,
        None => CredentialCollection::new(),
    };

    let mut imported = 0;
    let mut skipped = 0;

    for item in legacy {
        if collection.get(&item.id).is_some() {
            // 이전 시도에서 이미 가져옴
            imported += 1;
            continue;
        }
        if collection.contains_secret(&item.token) {
            tracing::warn!(id = %item.id, "Skipping legacy token already stored under another id");
            skipped += 1;
            continue;
        }
        // 형식 검사는 `add` 전용. 이미 저장된 토큰은 그대로 옮긴다.
        if !format::is_valid_token(&item.token) {
            tracing::warn!(id = %item.id, "Importing legacy token with unrecognized format");
        }
        collection.push(item.into_credential());
        imported += 1;
    }

    let bytes = codec::encode(&collection)?;
    store.update(CREDENTIALS_KEY, &bytes)?;
    Ok((imported, skipped))
}

/// 멱등 삭제. 실패해도 플래그가 이미 true이므로 다음 실행에서 다시 시도됩니다.
fn erase_legacy(settings: &SettingsStore) {
    if let Err(e) = settings.erase_legacy_tokens() {
        tracing::warn!(error = %e, "Failed to erase legacy tokens, will retry next launch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::model::Credential;
    use crate::db::SharedStore;
    use crate::secrets::InMemorySecretStore;
    use std::sync::Arc;

    fn token(prefix: &str, fill: char) -> String {
        match prefix {
            "secret_" => format!("secret_{}", fill.to_string().repeat(43)),
            _ => format!("ntn_{}", fill.to_string().repeat(46)),
        }
    }

    fn legacy(id: &str, token: String) -> LegacyCredential {
        LegacyCredential::from(&Credential {
            id: id.to_string(),
            ..Credential::new(format!("Legacy {}", id), token)
        })
    }

    fn setup() -> (InMemorySecretStore, SettingsStore) {
        let settings = SettingsStore::new(Arc::new(SharedStore::open_in_memory().unwrap()));
        (InMemorySecretStore::new(), settings)
    }

    fn stored(store: &InMemorySecretStore) -> CredentialCollection {
        codec::decode(&store.retrieve(CREDENTIALS_KEY).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_nothing_to_migrate_sets_flag() {
        let (store, settings) = setup();
        assert_eq!(
            run_migration(&store, &settings).unwrap(),
            MigrationOutcome::NothingToMigrate
        );
        assert!(settings.migration_flag().unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_migrates_then_flags_then_erases() {
        let (store, settings) = setup();
        let items = vec![legacy("1", token("secret_", 'a')), legacy("2", token("ntn_", 'b'))];
        settings
            .write_legacy_tokens_raw(&codec::encode_legacy(&items).unwrap())
            .unwrap();

        let outcome = run_migration(&store, &settings).unwrap();
        assert_eq!(outcome, MigrationOutcome::Migrated { imported: 2, skipped: 0 });
        assert!(settings.migration_flag().unwrap());
        assert!(settings.legacy_tokens_raw().unwrap().is_none());
        assert_eq!(stored(&store).len(), 2);
    }

    #[test]
    fn test_retry_after_crash_does_not_duplicate() {
        let (store, settings) = setup();
        let items = vec![legacy("1", token("secret_", 'a')), legacy("2", token("ntn_", 'b'))];
        settings
            .write_legacy_tokens_raw(&codec::encode_legacy(&items).unwrap())
            .unwrap();

        // 3단계만 끝나고 프로세스가 죽은 상황
        import_legacy(&store, items.clone()).unwrap();
        assert!(!settings.migration_flag().unwrap());
        let after_crash = stored(&store);

        run_migration(&store, &settings).unwrap();
        assert_eq!(stored(&store), after_crash);
        assert_eq!(stored(&store).len(), 2);
        assert!(settings.legacy_tokens_raw().unwrap().is_none());
    }

    #[test]
    fn test_flag_blocks_reimport() {
        let (store, settings) = setup();
        settings.set_migration_flag().unwrap();
        settings
            .write_legacy_tokens_raw(
                &codec::encode_legacy(&[legacy("late", token("secret_", 'z'))]).unwrap(),
            )
            .unwrap();

        assert_eq!(
            run_migration(&store, &settings).unwrap(),
            MigrationOutcome::AlreadyMigrated
        );
        assert!(store.retrieve(CREDENTIALS_KEY).unwrap().is_none());
    }

    #[test]
    fn test_unrecognized_format_is_kept_and_duplicates_skipped() {
        let (store, settings) = setup();
        let items = vec![
            legacy("1", token("secret_", 'a')),
            legacy("2", "secret_short".to_string()),
            legacy("3", token("secret_", 'a')),
        ];
        settings
            .write_legacy_tokens_raw(&codec::encode_legacy(&items).unwrap())
            .unwrap();

        let outcome = run_migration(&store, &settings).unwrap();
        assert_eq!(outcome, MigrationOutcome::Migrated { imported: 2, skipped: 1 });

        let collection = stored(&store);
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.get("2").unwrap().secret_value, "secret_short");
        assert!(collection.get("3").is_none());
        assert!(settings.legacy_tokens_raw().unwrap().is_none());
    }

    #[test]
    fn test_store_failure_leaves_flag_and_legacy_untouched() {
        let (store, settings) = setup();
        let raw = codec::encode_legacy(&[legacy("1", token("ntn_", 'c'))]).unwrap();
        settings.write_legacy_tokens_raw(&raw).unwrap();

        store.set_locked(true);
        let err = run_migration(&store, &settings).unwrap_err();
        assert!(matches!(err, CredentialError::StoreUnavailable(_)));
        assert!(!settings.migration_flag().unwrap());
        assert_eq!(settings.legacy_tokens_raw().unwrap().unwrap(), raw);

        store.set_locked(false);
        assert!(matches!(
            run_migration(&store, &settings).unwrap(),
            MigrationOutcome::Migrated { imported: 1, .. }
        ));
    }

    #[test]
    fn test_corrupt_legacy_is_surfaced() {
        let (store, settings) = setup();
        settings.write_legacy_tokens_raw(b"{garbage").unwrap();
        assert!(matches!(
            run_migration(&store, &settings),
            Err(CredentialError::CorruptPayload(_))
        ));
        assert!(!settings.migration_flag().unwrap());
    }
}
