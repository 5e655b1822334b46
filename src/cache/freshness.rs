//! 캐시 신선도 판정 (순수 함수)

use chrono::{DateTime, Utc};

/// 이 범위 안의 미래 시각은 프로세스 간 시계 오차로 보고 age 0으로 취급
pub const CLOCK_SKEW_TOLERANCE_MS: i64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
    SchemaMismatch,
    Absent,
}

impl Freshness {
    /// 읽는 쪽은 `Fresh`만 사용하고 나머지는 모두 "없음"으로 봅니다.
    pub fn is_usable(self) -> bool {
        self == Freshness::Fresh
    }
}

/// 엔트리 메타데이터 (payload 제외)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub schema_version: u32,
    pub cached_at: DateTime<Utc>,
}

/// 스키마 → 시계 오차 → 나이 순으로 판정
pub fn evaluate(
    meta: &EntryMeta,
    now: DateTime<Utc>,
    max_age: std::time::Duration,
    expected_schema_version: u32,
) -> Freshness {
    if meta.schema_version != expected_schema_version {
        return Freshness::SchemaMismatch;
    }

    let age = now.signed_duration_since(meta.cached_at);
    let age = if age < chrono::Duration::zero() {
        if -age > chrono::Duration::milliseconds(CLOCK_SKEW_TOLERANCE_MS) {
            return Freshness::Stale;
        }
        chrono::Duration::zero()
    } else {
        age
    };

    // 표현 범위를 넘는 max_age는 무제한으로 취급
    match chrono::Duration::from_std(max_age) {
        Ok(max_age) if age > max_age => Freshness::Stale,
        _ => Freshness::Fresh,
    }
}

pub fn evaluate_entry(
    meta: Option<&EntryMeta>,
    now: DateTime<Utc>,
    max_age: std::time::Duration,
    expected_schema_version: u32,
) -> Freshness {
    match meta {
        Some(meta) => evaluate(meta, now, max_age, expected_schema_version),
        None => Freshness::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn meta(version: u32, cached_at: DateTime<Utc>) -> EntryMeta {
        EntryMeta {
            schema_version: version,
            cached_at,
        }
    }

    #[test]
    fn test_max_age_boundary_is_inclusive() {
        let now = Utc::now();
        let max_age = Duration::from_secs(300);

        let exactly = meta(1, now - chrono::Duration::seconds(300));
        assert_eq!(evaluate(&exactly, now, max_age, 1), Freshness::Fresh);

        let just_over = meta(1, now - chrono::Duration::milliseconds(300_001));
        assert_eq!(evaluate(&just_over, now, max_age, 1), Freshness::Stale);
    }

    #[test]
    fn test_schema_checked_before_age() {
        let now = Utc::now();
        let old = meta(2, now - chrono::Duration::days(30));
        assert_eq!(
            evaluate(&old, now, Duration::from_secs(60), 3),
            Freshness::SchemaMismatch
        );
    }

    #[test]
    fn test_future_timestamps() {
        let now = Utc::now();
        let max_age = Duration::from_secs(60);

        let slight = meta(1, now + chrono::Duration::seconds(2));
        assert_eq!(evaluate(&slight, now, max_age, 1), Freshness::Fresh);

        let far = meta(1, now + chrono::Duration::minutes(10));
        assert_eq!(evaluate(&far, now, max_age, 1), Freshness::Stale);
    }

    #[test]
    fn test_absent_and_usable() {
        assert_eq!(
            evaluate_entry(None, Utc::now(), Duration::from_secs(1), 1),
            Freshness::Absent
        );
        assert!(Freshness::Fresh.is_usable());
        assert!(!Freshness::Stale.is_usable());
        assert!(!Freshness::SchemaMismatch.is_usable());
        assert!(!Freshness::Absent.is_usable());
    }

    #[test]
    fn test_zero_max_age() {
        let now = Utc::now();
        assert_eq!(
            evaluate(&meta(1, now), now, Duration::ZERO, 1),
            Freshness::Fresh
        );
        assert_eq!(
            evaluate(&meta(1, now - chrono::Duration::milliseconds(1)), now, Duration::ZERO, 1),
            Freshness::Stale
        );
    }
}
