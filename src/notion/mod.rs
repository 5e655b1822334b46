//! Notion REST API 연동 모듈
//!
//! 토큰 검증과 최근 레코드 조회만 다룹니다.

pub mod client;
pub mod types;

pub use client::NotionClient;
