//! Fixed instruction prompts for the language-model calls.

/// System prompt for per-note insight extraction
pub const EXTRACTION_PROMPT: &str = r#"You extract structured insights from a transcribed voice note.

Return ONLY a JSON object with exactly these keys:
{
  "decisions":   [{"text": "...", "owner": "...", "due": "..."}],
  "actions":     [{"text": "...", "owner": "...", "due": "..."}],
  "commitments": [{"text": "...", "owner": "...", "due": "..."}],
  "unresolved":  [{"text": "..."}]
}

Rules:
- decisions: choices that were made.
- actions: concrete tasks someone needs to do.
- commitments: promises the speaker or others made to someone.
- unresolved: open questions or items left undecided.
- "owner" and "due" are optional; omit them when the note does not say.
- Keep each "text" short and in the speaker's language.
- Use empty arrays when a category has nothing. Do not invent content."#;

/// System prompt for the once-a-day digest
pub const DIGEST_PROMPT: &str = r#"You write a short daily brief from a person's voice notes of the previous day.

Return ONLY a JSON object:
{
  "summary": "two to four sentences on what the day was about",
  "highlights": ["most important decisions or outcomes"],
  "open_loops": ["actions, commitments or questions still open"]
}

If there were no notes, say so briefly in "summary" and use empty arrays."#;
