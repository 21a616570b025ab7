//! Parsing of language-model responses.
//!
//! Models are asked for a bare JSON object. A Markdown code fence around the
//! object is tolerated; anything else that fails to parse is a
//! [`ApiError::MalformedResponse`].

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::ApiError;
use crate::domain::{DigestBody, InsightItem};

/// Insight lists as returned by the extraction call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedInsights {
    pub decisions: Vec<InsightItem>,
    pub actions: Vec<InsightItem>,
    pub commitments: Vec<InsightItem>,
    pub unresolved: Vec<InsightItem>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    decisions: Vec<RawItem>,
    #[serde(default)]
    actions: Vec<RawItem>,
    #[serde(default)]
    commitments: Vec<RawItem>,
    #[serde(default)]
    unresolved: Vec<RawItem>,
}

/// Items arrive either as objects or, from some models, as bare strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawItem {
    Text(String),
    Full {
        text: String,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        due: Option<String>,
    },
}

impl RawItem {
    fn into_item(self) -> Option<InsightItem> {
        let (text, owner, due) = match self {
            RawItem::Text(text) => (text, None, None),
            RawItem::Full { text, owner, due } => (text, owner, due),
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            return None;
        }
        Some(InsightItem {
            text,
            owner: non_empty(owner),
            due: non_empty(due),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

fn collect(items: Vec<RawItem>) -> Vec<InsightItem> {
    items.into_iter().filter_map(RawItem::into_item).collect()
}

/// Parse the extraction call's message content
pub fn parse_extraction(content: &str) -> Result<ExtractedInsights, ApiError> {
    let raw: RawExtraction = parse_json_object(content)?;
    Ok(ExtractedInsights {
        decisions: collect(raw.decisions),
        actions: collect(raw.actions),
        commitments: collect(raw.commitments),
        unresolved: collect(raw.unresolved),
    })
}

/// Parse the digest call's message content
pub fn parse_digest(content: &str) -> Result<DigestBody, ApiError> {
    let mut digest: DigestBody = parse_json_object(content)?;
    digest.summary = digest.summary.trim().to_string();
    if digest.summary.is_empty() {
        return Err(ApiError::MalformedResponse(
            "digest summary is empty".to_string(),
        ));
    }
    Ok(digest)
}

fn parse_json_object<T: DeserializeOwned>(content: &str) -> Result<T, ApiError> {
    let body = strip_code_fence(content);
    if !body.starts_with('{') {
        return Err(ApiError::MalformedResponse(format!(
            "expected a JSON object, got: {}",
            preview(body)
        )));
    }
    serde_json::from_str(body).map_err(|e| ApiError::MalformedResponse(e.to_string()))
}

/// Remove a surrounding ```json fence, if present
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn preview(body: &str) -> String {
    body.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_extraction() {
        let content = r#"{
            "decisions": [{"text": "Launch on Monday"}],
            "actions": [{"text": "Draft release notes", "owner": "Ana", "due": "2024-03-04"}],
            "commitments": [{"text": "Review PR", "owner": null}],
            "unresolved": ["Pricing for EU?"]
        }"#;

        let insights = parse_extraction(content).unwrap();
        assert_eq!(insights.decisions.len(), 1);
        assert_eq!(insights.actions[0].owner.as_deref(), Some("Ana"));
        assert_eq!(insights.commitments[0].owner, None);
        assert_eq!(insights.unresolved[0].text, "Pricing for EU?");
    }

    #[test]
    fn test_missing_arrays_default_to_empty() {
        let insights = parse_extraction(r#"{"actions": []}"#).unwrap();
        assert_eq!(insights, ExtractedInsights::default());
    }

    #[test]
    fn test_fenced_json_accepted() {
        let content = "```json\n{\"decisions\": [\"Keep the name\"]}\n```";
        let insights = parse_extraction(content).unwrap();
        assert_eq!(insights.decisions[0].text, "Keep the name");
    }

    #[test]
    fn test_blank_items_dropped() {
        let insights = parse_extraction(r#"{"actions": [{"text": "  "}, "ok"]}"#).unwrap();
        assert_eq!(insights.actions.len(), 1);
    }

    #[test]
    fn test_non_json_is_malformed() {
        let err = parse_extraction("Sure! Here are your insights.").unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));

        let err = parse_extraction(r#"{"actions": "not a list"}"#).unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_digest() {
        let digest = parse_digest(r#"{"summary": " Busy day ", "highlights": ["Shipped"]}"#).unwrap();
        assert_eq!(digest.summary, "Busy day");
        assert_eq!(digest.highlights, vec!["Shipped".to_string()]);

        assert!(parse_digest(r#"{"summary": ""}"#).is_err());
    }
}
