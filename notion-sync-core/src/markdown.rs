//! Block-to-Markdown translation, title extraction and path construction.
//!
//! Everything in here is a pure function of its input: no I/O, no logging.
//! The traversal in [`crate::notion`] feeds raw block JSON through
//! [`Block::from_json`] and [`Block::to_markdown`] and composes document paths
//! with [`sanitize`], [`path_segment`] and [`combine`].

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::contract::SyncError;

pub const PAGE_FALLBACK_TITLE: &str = "page";
pub const DATABASE_FALLBACK_TITLE: &str = "database";
pub const CODE_FALLBACK_LANGUAGE: &str = "plaintext";

/// Typed payload of one Notion block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph { text: String },
    Heading { level: u8, text: String },
    BulletedListItem { text: String },
    NumberedListItem { text: String },
    ToDo { text: String, checked: bool },
    Code { language: String, text: String },
    ChildPage { title: String },
    /// Any other block type. `text` is set when the payload carries a `rich_text` array.
    Other { kind: String, text: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: String,
    pub has_children: bool,
    pub kind: BlockKind,
}

impl Block {
    /// Parses one entry of a `/blocks/{id}/children` response.
    ///
    /// Fails with [`SyncError::MalformedBlock`] when `id` or `type` is missing, or
    /// when an enumerated type has no payload object under its type key.
    pub fn from_json(value: &Value) -> Result<Block, SyncError> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("<unknown>", "missing `id`"))?
            .to_string();
        let block_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(&id, "missing `type`"))?;
        let has_children = value
            .get("has_children")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let payload = value.get(block_type);

        let typed_payload = || {
            payload
                .filter(|p| p.is_object())
                .ok_or_else(|| malformed(&id, &format!("`{block_type}` payload is not an object")))
        };

        let kind = match block_type {
            "paragraph" => BlockKind::Paragraph {
                text: plain_text(typed_payload()?.get("rich_text")),
            },
            "heading_1" | "heading_2" | "heading_3" => BlockKind::Heading {
                level: match block_type {
                    "heading_1" => 1,
                    "heading_2" => 2,
                    _ => 3,
                },
                text: plain_text(typed_payload()?.get("rich_text")),
            },
            "bulleted_list_item" => BlockKind::BulletedListItem {
                text: plain_text(typed_payload()?.get("rich_text")),
            },
            "numbered_list_item" => BlockKind::NumberedListItem {
                text: plain_text(typed_payload()?.get("rich_text")),
            },
            "to_do" => {
                let payload = typed_payload()?;
                BlockKind::ToDo {
                    text: plain_text(payload.get("rich_text")),
                    checked: payload
                        .get("checked")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                }
            }
            "code" => {
                let payload = typed_payload()?;
                let language = payload
                    .get("language")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .unwrap_or(CODE_FALLBACK_LANGUAGE)
                    .to_string();
                BlockKind::Code {
                    language,
                    text: plain_text(payload.get("rich_text")),
                }
            }
            "child_page" => BlockKind::ChildPage {
                title: typed_payload()?
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            },
            other => BlockKind::Other {
                kind: other.to_string(),
                text: payload
                    .and_then(|p| p.get("rich_text"))
                    .filter(|rt| rt.is_array())
                    .map(|rt| plain_text(Some(rt))),
            },
        };

        Ok(Block {
            id,
            has_children,
            kind,
        })
    }

    /// Renders this block at the given nesting depth (two spaces of indent per level).
    pub fn to_markdown(&self, depth: usize) -> Vec<String> {
        let indent = "  ".repeat(depth);
        match &self.kind {
            BlockKind::Paragraph { text } => vec![format!("{indent}{text}")],
            BlockKind::Heading { level, text } => {
                vec![format!("{} {text}", "#".repeat(usize::from(*level)))]
            }
            BlockKind::BulletedListItem { text } => vec![format!("{indent}- {text}")],
            BlockKind::NumberedListItem { text } => vec![format!("{indent}1. {text}")],
            BlockKind::ToDo { text, checked } => {
                let mark = if *checked { "x" } else { " " };
                vec![format!("{indent}- [{mark}] {text}")]
            }
            BlockKind::Code { language, text } => {
                vec![format!("```{language}"), text.clone(), "```".to_string()]
            }
            BlockKind::ChildPage { title } => {
                let title = if title.is_empty() {
                    PAGE_FALLBACK_TITLE
                } else {
                    title.as_str()
                };
                vec![format!("{indent}- {title} (sub-page)")]
            }
            BlockKind::Other { text, .. } => match text {
                Some(text) => vec![format!("{indent}{text}")],
                None => Vec::new(),
            },
        }
    }
}

fn malformed(id: &str, reason: &str) -> SyncError {
    SyncError::MalformedBlock {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// Concatenated `plain_text` of a rich-text array, trimmed. Empty if absent or not an array.
pub fn plain_text(rich_text: Option<&Value>) -> String {
    match rich_text.and_then(Value::as_array) {
        Some(fragments) => fragments
            .iter()
            .filter_map(|f| f.get("plain_text").and_then(Value::as_str))
            .collect::<String>()
            .trim()
            .to_string(),
        None => String::new(),
    }
}

/// First `title`-typed property of a page's `properties` object.
///
/// Also accepts the legacy shape where the title node is itself an array of
/// rich-text entries. Returns `None` when nothing non-empty is found.
pub fn title_from_properties(properties: &Value) -> Option<String> {
    let title = match properties {
        Value::Object(map) => map.iter().find_map(|(key, prop)| {
            if prop.get("type").and_then(Value::as_str) == Some("title") {
                Some(plain_text(prop.get("title")))
            } else if key == "title" && prop.is_array() {
                Some(plain_text(Some(prop)))
            } else {
                None
            }
        }),
        Value::Array(_) => Some(plain_text(Some(properties))),
        _ => None,
    };
    title.filter(|t| !t.is_empty())
}

/// Title of a page object (`GET /pages/{id}`).
pub fn page_title(page: &Value) -> Option<String> {
    page.get("properties").and_then(title_from_properties)
}

/// Title of a database object (`GET /databases/{id}`).
pub fn database_title(database: &Value) -> Option<String> {
    Some(plain_text(database.get("title"))).filter(|t| !t.is_empty())
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn unsafe_char() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static regex"))
}

/// Maps a free-form title to a path-segment-safe string.
///
/// Trims, collapses whitespace runs to `_`, then replaces every character outside
/// `[A-Za-z0-9_.-]` with `-`.
pub fn sanitize(input: &str) -> String {
    let collapsed = whitespace_run().replace_all(input.trim(), "_");
    unsafe_char().replace_all(&collapsed, "-").into_owned()
}

/// Sanitized segment for `title`, or the sanitized `fallback` when the title is
/// missing or sanitizes to something without a single ASCII letter or digit.
pub fn path_segment(title: Option<&str>, fallback: &str) -> String {
    let segment = title.map(sanitize).unwrap_or_default();
    if segment.chars().any(|c| c.is_ascii_alphanumeric()) {
        segment
    } else {
        sanitize(fallback)
    }
}

/// Joins two path parts with `/`, eliding whichever is empty.
pub fn combine(base: &str, leaf: &str) -> String {
    match (base.is_empty(), leaf.is_empty()) {
        (true, _) => leaf.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{leaf}"),
    }
}
