//! Structured insights extracted from a note's transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Insights derived from one note.
///
/// Refers to its note by id only. Removing the note leaves historical
/// extraction records in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Unique identifier for this extraction
    pub id: Uuid,

    /// The note this was derived from
    pub note_id: Uuid,

    #[serde(default)]
    pub decisions: Vec<InsightItem>,

    #[serde(default)]
    pub actions: Vec<InsightItem>,

    #[serde(default)]
    pub commitments: Vec<InsightItem>,

    #[serde(default)]
    pub unresolved: Vec<InsightItem>,

    /// Model that produced the extraction
    pub model: String,

    /// Hash of the transcript the extraction was derived from
    pub transcript_hash: String,

    /// When the extraction completed
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// Items of one kind
    pub fn items(&self, kind: InsightKind) -> &[InsightItem] {
        match kind {
            InsightKind::Decision => &self.decisions,
            InsightKind::Action => &self.actions,
            InsightKind::Commitment => &self.commitments,
            InsightKind::Unresolved => &self.unresolved,
        }
    }

    /// Total number of extracted items
    pub fn total_items(&self) -> usize {
        InsightKind::ALL.iter().map(|k| self.items(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }
}

/// A single decision, action, commitment or open question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightItem {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
}

impl InsightItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            owner: None,
            due: None,
        }
    }

    /// One-line rendering used in prompts and terminal output
    pub fn render(&self) -> String {
        let mut line = self.text.clone();
        if let Some(owner) = &self.owner {
            line.push_str(&format!(" (owner: {})", owner));
        }
        if let Some(due) = &self.due {
            line.push_str(&format!(" (due: {})", due));
        }
        line
    }
}

/// Categories of extracted insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Decision,
    Action,
    Commitment,
    Unresolved,
}

impl InsightKind {
    pub const ALL: [InsightKind; 4] = [
        InsightKind::Decision,
        InsightKind::Action,
        InsightKind::Commitment,
        InsightKind::Unresolved,
    ];

    pub fn heading(self) -> &'static str {
        match self {
            Self::Decision => "Decisions",
            Self::Action => "Actions",
            Self::Commitment => "Commitments",
            Self::Unresolved => "Unresolved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_owner_and_due() {
        let item = InsightItem {
            text: "Send the contract".to_string(),
            owner: Some("Sam".to_string()),
            due: Some("Friday".to_string()),
        };
        assert_eq!(item.render(), "Send the contract (owner: Sam) (due: Friday)");
        assert_eq!(InsightItem::new("Ping legal").render(), "Ping legal");
    }

    #[test]
    fn test_total_items() {
        let result = ExtractionResult {
            id: Uuid::new_v4(),
            note_id: Uuid::new_v4(),
            decisions: vec![InsightItem::new("a")],
            actions: vec![InsightItem::new("b"), InsightItem::new("c")],
            commitments: vec![],
            unresolved: vec![InsightItem::new("d")],
            model: "test".to_string(),
            transcript_hash: "0".repeat(16),
            extracted_at: Utc::now(),
        };
        assert_eq!(result.total_items(), 4);
        assert_eq!(result.items(InsightKind::Action).len(), 2);
        assert!(!result.is_empty());
    }
}
