//! Notion API 응답 타입 정의
//!
//! 토큰 검증(`users/me`)과 최근 레코드 요약(`databases/{id}/query`)에 필요한 만큼만 정의합니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `GET /v1/users/me` 응답 (integration bot 사용자)
#[derive(Debug, Clone, Deserialize)]
pub struct UserMe {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bot: Option<BotInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotInfo {
    #[serde(default)]
    pub workspace_name: Option<String>,
}

impl UserMe {
    /// bot 정보의 워크스페이스 이름, 없으면 사용자 이름
    pub fn workspace_label(&self) -> Option<String> {
        self.bot
            .as_ref()
            .and_then(|bot| bot.workspace_name.clone())
            .or_else(|| self.name.clone())
            .filter(|s| !s.trim().is_empty())
    }
}

/// 페이지 객체
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub last_edited_time: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Page {
    /// title 타입 속성의 텍스트 (없으면 빈 문자열)
    pub fn title(&self) -> String {
        self.properties
            .values()
            .find_map(|value| match value {
                PropertyValue::Title { title } => Some(plain_text(title)),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// 데이터베이스 속성 값
///
/// 알 수 없는 타입은 `Unrecognized`로 받아 무시합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title {
        #[serde(default)]
        title: Vec<RichText>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<RichText>,
    },
    Number {
        #[serde(default)]
        number: Option<f64>,
    },
    Select {
        #[serde(default)]
        select: Option<SelectOption>,
    },
    MultiSelect {
        #[serde(default)]
        multi_select: Vec<SelectOption>,
    },
    Status {
        #[serde(default)]
        status: Option<SelectOption>,
    },
    Date {
        #[serde(default)]
        date: Option<DateRange>,
    },
    Checkbox {
        #[serde(default)]
        checkbox: bool,
    },
    People {
        #[serde(default)]
        people: Vec<PersonRef>,
    },
    Url {
        #[serde(default)]
        url: Option<String>,
    },
    #[serde(other)]
    Unrecognized,
}

impl PropertyValue {
    /// 요약 표시용 텍스트. 값이 비어 있거나 알 수 없는 타입이면 `None`.
    pub fn display_text(&self) -> Option<String> {
        let text = match self {
            PropertyValue::Title { title } => plain_text(title),
            PropertyValue::RichText { rich_text } => plain_text(rich_text),
            PropertyValue::Number { number } => number.map(format_number)?,
            PropertyValue::Select { select } | PropertyValue::Status { status: select } => {
                select.as_ref()?.name.clone()
            }
            PropertyValue::MultiSelect { multi_select } => multi_select
                .iter()
                .map(|o| o.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            PropertyValue::Date { date } => {
                let date = date.as_ref()?;
                match &date.end {
                    Some(end) => format!("{} → {}", date.start, end),
                    None => date.start.clone(),
                }
            }
            PropertyValue::Checkbox { checkbox } => {
                let mark = if *checkbox { "✓" } else { "✗" };
                mark.to_string()
            }
            PropertyValue::People { people } => people
                .iter()
                .filter_map(|p| p.name.as_deref())
                .collect::<Vec<_>>()
                .join(", "),
            PropertyValue::Url { url } => url.clone()?,
            PropertyValue::Unrecognized => return None,
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Rich text 배열 → plain text
pub fn plain_text(items: &[RichText]) -> String {
    items
        .iter()
        .filter_map(|item| item.plain_text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

/// Rich Text 객체 (plain_text만 사용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// 데이터베이스 쿼리 요청
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseQueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorts: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl DatabaseQueryRequest {
    /// 최근 수정순 상위 N개
    pub fn recently_edited(page_size: u32) -> Self {
        Self {
            sorts: Some(vec![serde_json::json!({
                "timestamp": "last_edited_time",
                "direction": "descending"
            })]),
            page_size: Some(page_size),
        }
    }
}

/// 데이터베이스 쿼리 응답
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseQueryResponse {
    pub results: Vec<Page>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Notion API 에러 응답
#[derive(Debug, Clone, Deserialize)]
pub struct NotionError {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_properties_parse() {
        let json = r#"{
            "id": "p1",
            "last_edited_time": "2024-05-01T10:00:00.000Z",
            "properties": {
                "Name": {"id": "title", "type": "title", "title": [{"plain_text": "Launch "}, {"plain_text": "plan"}]},
                "Stage": {"id": "a", "type": "status", "status": {"name": "In progress", "color": "blue"}},
                "Tags": {"id": "b", "type": "multi_select", "multi_select": [{"name": "ops"}, {"name": "q3"}]},
                "Score": {"id": "c", "type": "number", "number": 3},
                "Done": {"id": "d", "type": "checkbox", "checkbox": true},
                "Due": {"id": "e", "type": "date", "date": {"start": "2024-06-01", "end": null}},
                "Owner": {"id": "f", "type": "people", "people": [{"id": "u1", "name": "Kim"}]},
                "Formula": {"id": "g", "type": "formula", "formula": {"type": "number", "number": 1}}
            }
        }"#;
        let page: Page = serde_json::from_str(json).unwrap();

        assert_eq!(page.title(), "Launch plan");
        assert_eq!(
            page.properties["Stage"].display_text().as_deref(),
            Some("In progress")
        );
        assert_eq!(page.properties["Tags"].display_text().as_deref(), Some("ops, q3"));
        assert_eq!(page.properties["Score"].display_text().as_deref(), Some("3"));
        assert_eq!(page.properties["Done"].display_text().as_deref(), Some("✓"));
        assert_eq!(page.properties["Due"].display_text().as_deref(), Some("2024-06-01"));
        assert_eq!(page.properties["Owner"].display_text().as_deref(), Some("Kim"));
        assert_eq!(page.properties["Formula"], PropertyValue::Unrecognized);
        assert!(page.properties["Formula"].display_text().is_none());
    }

    #[test]
    fn test_empty_values_have_no_text() {
        let empty = [
            PropertyValue::Select { select: None },
            PropertyValue::RichText { rich_text: vec![] },
            PropertyValue::Number { number: None },
            PropertyValue::Url { url: None },
        ];
        for value in empty {
            assert!(value.display_text().is_none(), "{:?}", value);
        }
    }

    #[test]
    fn test_user_me_workspace_label() {
        let me: UserMe = serde_json::from_str(
            r#"{"object":"user","id":"u","name":"Sync Bot","type":"bot","bot":{"owner":{"type":"workspace","workspace":true},"workspace_name":"Acme HQ"}}"#,
        )
        .unwrap();
        assert_eq!(me.workspace_label().as_deref(), Some("Acme HQ"));

        let bare: UserMe = serde_json::from_str(r#"{"id":"u","name":"Sync Bot"}"#).unwrap();
        assert_eq!(bare.workspace_label().as_deref(), Some("Sync Bot"));
    }
}
