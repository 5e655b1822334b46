//! 토큰 형식 검증
//!
//! 허용 형식은 추가만 가능합니다. 기존 형식을 빼면 이미 저장된 토큰이 무효가 됩니다.

use crate::error::{CredentialError, CredentialResult};

/// 고정 prefix + 고정 길이 영숫자 본문
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenShape {
    pub prefix: &'static str,
    pub body_len: usize,
}

impl TokenShape {
    pub fn total_len(&self) -> usize {
        self.prefix.len() + self.body_len
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match candidate.strip_prefix(self.prefix) {
            Some(body) => {
                body.len() == self.body_len && body.chars().all(|c| c.is_ascii_alphanumeric())
            }
            None => false,
        }
    }
}

/// 내부 통합 토큰 (구 형식 / 신 형식)
pub const ACCEPTED_SHAPES: &[TokenShape] = &[
    TokenShape {
        prefix: "secret_",
        body_len: 43,
    },
    TokenShape {
        prefix: "ntn_",
        body_len: 46,
    },
];

pub fn is_valid_token(candidate: &str) -> bool {
    ACCEPTED_SHAPES.iter().any(|shape| shape.matches(candidate))
}

pub fn validate_token(candidate: &str) -> CredentialResult<()> {
    if is_valid_token(candidate) {
        Ok(())
    } else {
        Err(CredentialError::InvalidFormat)
    }
}
