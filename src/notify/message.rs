//! Message composition
//!
//! Messages are a plain-text fallback plus Block Kit blocks: one section carrying the summary
//! and, when an affordance is attached, one actions block with a single button.

use serde::Serialize;

/// Character budget for any outbound block of text
pub const MAX_TEXT_CHARS: usize = 2800;

/// Appended whenever text was cut to [`MAX_TEXT_CHARS`]
pub const TRUNCATION_MARKER: &str = "\n… _(truncated)_";

/// Slack rejects button values longer than this
pub const BUTTON_VALUE_LIMIT: usize = 2000;

/// Modal titles are capped by Slack
const MODAL_TITLE_LIMIT: usize = 24;

pub const VIEW_SCHEMA_ACTION: &str = "view_full_schema";
pub const VIEW_ROW_ACTION: &str = "view_full_entry";

/// Cut `text` to `limit` characters, appending [`TRUNCATION_MARKER`] when anything was removed
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextObject {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl TextObject {
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            kind: "mrkdwn",
            text: text.into(),
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: "plain_text",
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: TextObject,
    pub action_id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { text: TextObject },
    Actions { elements: Vec<Button> },
}

/// "View full ..." button carrying an opaque value back to the callback handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affordance {
    pub action_id: &'static str,
    pub label: &'static str,
    pub value: String,
}

impl Affordance {
    pub fn view_schema(qualified_name: impl Into<String>) -> Self {
        Self {
            action_id: VIEW_SCHEMA_ACTION,
            label: "View full schema",
            value: qualified_name.into(),
        }
    }

    pub fn view_row(row_json: impl Into<String>) -> Self {
        Self {
            action_id: VIEW_ROW_ACTION,
            label: "View full entry",
            value: row_json.into(),
        }
    }

    pub fn fits(&self) -> bool {
        self.value.chars().count() <= BUTTON_VALUE_LIMIT
    }
}

/// `chat.postMessage` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub channel: String,
    /// Notification fallback text
    pub text: String,
    pub blocks: Vec<Block>,
}

impl OutboundMessage {
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        let text = truncate(&text.into(), MAX_TEXT_CHARS);
        Self {
            channel: channel.into(),
            blocks: vec![Block::Section {
                text: TextObject::mrkdwn(text.clone()),
            }],
            text,
        }
    }

    pub fn with_affordance(mut self, affordance: Affordance) -> Self {
        self.blocks.push(Block::Actions {
            elements: vec![Button {
                kind: "button",
                text: TextObject::plain(affordance.label),
                action_id: affordance.action_id.to_string(),
                value: affordance.value,
            }],
        });
        self
    }

    /// The attached button, if any
    pub fn affordance(&self) -> Option<&Button> {
        self.blocks.iter().find_map(|block| match block {
            Block::Actions { elements } => elements.first(),
            Block::Section { .. } => None,
        })
    }
}

/// Follow-up payload returned by an interactive handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    pub title: String,
    /// Already truncated mrkdwn body
    pub body: String,
}

impl DetailView {
    pub fn new(title: impl Into<String>, body: &str) -> Self {
        Self {
            title: title.into(),
            body: truncate(body, MAX_TEXT_CHARS),
        }
    }

    /// Body shown in a code block (definitions)
    pub fn preformatted(title: impl Into<String>, body: &str) -> Self {
        let mut view = Self::new(title, body);
        view.body = format!("```{}```", view.body);
        view
    }

    /// Slack modal view for `views.open`
    pub fn to_modal(&self) -> serde_json::Value {
        let title: String = self.title.chars().take(MODAL_TITLE_LIMIT).collect();
        let blocks = vec![Block::Section {
            text: TextObject::mrkdwn(self.body.clone()),
        }];
        serde_json::json!({
            "type": "modal",
            "title": TextObject::plain(title),
            "close": TextObject::plain("Close"),
            "blocks": blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truncate_long_text() {
        let text = "x".repeat(5000);
        let truncated = truncate(&text, MAX_TEXT_CHARS);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        let kept = truncated.trim_end_matches(TRUNCATION_MARKER);
        assert_eq!(kept.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate("short", MAX_TEXT_CHARS), "short");
        let exact = "y".repeat(MAX_TEXT_CHARS);
        assert_eq!(truncate(&exact, MAX_TEXT_CHARS), exact);
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let text = "é".repeat(10);
        assert_eq!(truncate(&text, 4), format!("éééé{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_message_with_affordance_serializes_to_blocks() {
        let message = OutboundMessage::new("alerts", "*Table Created*")
            .with_affordance(Affordance::view_schema("public.Orders"));

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({
                "channel": "alerts",
                "text": "*Table Created*",
                "blocks": [
                    {"type": "section", "text": {"type": "mrkdwn", "text": "*Table Created*"}},
                    {"type": "actions", "elements": [{
                        "type": "button",
                        "text": {"type": "plain_text", "text": "View full schema"},
                        "action_id": "view_full_schema",
                        "value": "public.Orders"
                    }]}
                ]
            })
        );
    }

    #[test]
    fn test_message_without_affordance() {
        let message = OutboundMessage::new("alerts", "*Table Deleted*");
        assert!(message.affordance().is_none());
        assert_eq!(message.blocks.len(), 1);
    }

    #[test]
    fn test_oversized_row_affordance_does_not_fit() {
        assert!(Affordance::view_row("{}").fits());
        assert!(!Affordance::view_row("x".repeat(BUTTON_VALUE_LIMIT + 1)).fits());
    }

    #[test]
    fn test_detail_view_modal() {
        let view = DetailView::preformatted("Schema: a_really_long_table_name_here", "CREATE TABLE t ();");
        let modal = view.to_modal();
        assert_eq!(modal["type"], "modal");
        assert_eq!(modal["title"]["text"].as_str().unwrap().chars().count(), 24);
        assert_eq!(modal["blocks"][0]["text"]["text"], "```CREATE TABLE t ();```");
    }
}
