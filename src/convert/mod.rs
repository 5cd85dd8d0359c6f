//! Content format conversion between the structured document tree and the
//! backend's inline wiki markup.
//!
//! Conversion never fails: a handler failure re-runs the whole tree as a
//! plain text extraction and flags the result with `used_fallback`.

pub mod detect;
pub mod markup;
pub mod plain;
pub mod validate;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use detect::{detect_format, is_document_value, FormatDetection};
pub use markup::to_markup;
pub use plain::to_plain_text;
pub use validate::{validate_markup, MarkupValidation};

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// One node of a structured document.
///
/// Field names follow this crate's model; the backend's own `type`,
/// `attrs` and `content` names are accepted when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default, alias = "attrs", skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, alias = "content", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
}

impl Node {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.push(mark);
        self
    }

    pub fn node_kind(&self) -> NodeKind {
        NodeKind::from(self.kind.as_str())
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        self.attributes.get(key).and_then(Value::as_u64)
    }
}

/// Formatting annotation applied to leaf text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default, alias = "attrs", skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Mark {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Closed set of node kinds with a dedicated handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Paragraph,
    Heading,
    BulletList,
    OrderedList,
    ListItem,
    Text,
    HardBreak,
    Link,
    InlineCard,
    CodeBlock,
    Blockquote,
    Table,
    TableRow,
    TableHeader,
    TableCell,
    Rule,
    Mention,
    Media,
    MediaSingle,
    MediaGroup,
    Panel,
    Emoji,
    Unknown(String),
}

impl From<&str> for NodeKind {
    fn from(kind: &str) -> Self {
        match kind {
            "doc" | "document" => NodeKind::Document,
            "paragraph" => NodeKind::Paragraph,
            "heading" => NodeKind::Heading,
            "bulletList" => NodeKind::BulletList,
            "orderedList" => NodeKind::OrderedList,
            "listItem" => NodeKind::ListItem,
            "text" => NodeKind::Text,
            "hardBreak" => NodeKind::HardBreak,
            "link" => NodeKind::Link,
            "inlineCard" => NodeKind::InlineCard,
            "codeBlock" => NodeKind::CodeBlock,
            "blockquote" => NodeKind::Blockquote,
            "table" => NodeKind::Table,
            "tableRow" => NodeKind::TableRow,
            "tableHeader" => NodeKind::TableHeader,
            "tableCell" => NodeKind::TableCell,
            "rule" => NodeKind::Rule,
            "mention" => NodeKind::Mention,
            "media" => NodeKind::Media,
            "mediaSingle" => NodeKind::MediaSingle,
            "mediaGroup" => NodeKind::MediaGroup,
            "panel" => NodeKind::Panel,
            "emoji" => NodeKind::Emoji,
            other => NodeKind::Unknown(other.to_string()),
        }
    }
}

impl NodeKind {
    /// Kinds that occupy their own block in plain text extraction
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph
                | NodeKind::Heading
                | NodeKind::ListItem
                | NodeKind::CodeBlock
                | NodeKind::Blockquote
                | NodeKind::TableRow
                | NodeKind::Rule
                | NodeKind::MediaSingle
                | NodeKind::Panel
        )
    }
}

/// Text formats known to the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Document,
    Markup,
    Html,
    Plain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOptions {
    #[serde(default = "ConversionOptions::default_max_depth")]
    pub max_depth: usize,
    /// Emit `[unsupported: kind]` for unknown nodes instead of their text
    #[serde(default)]
    pub emit_unsupported_markers: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            emit_unsupported_markers: false,
        }
    }
}

impl ConversionOptions {
    fn default_max_depth() -> usize {
        DEFAULT_MAX_DEPTH
    }
}

/// Outcome of a conversion, always populated
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub content: String,
    pub target_format: Format,
    pub warnings: Vec<String>,
    pub unsupported_kinds: BTreeSet<String>,
    pub used_fallback: bool,
}

/// Input accepted by the converter
#[derive(Debug, Clone)]
pub enum ContentInput {
    Document(Node),
    /// A string that is either a serialized document or existing markup
    Legacy(String),
}

impl From<Node> for ContentInput {
    fn from(node: Node) -> Self {
        ContentInput::Document(node)
    }
}

impl From<String> for ContentInput {
    fn from(text: String) -> Self {
        ContentInput::Legacy(text)
    }
}

impl From<&str> for ContentInput {
    fn from(text: &str) -> Self {
        ContentInput::Legacy(text.to_string())
    }
}

/// Convert tree or legacy input to markup.
pub fn convert_content(input: ContentInput, options: &ConversionOptions) -> ConversionResult {
    match input {
        ContentInput::Document(node) => to_markup(&node, options),
        ContentInput::Legacy(text) => {
            let parsed = serde_json::from_str::<Value>(text.trim())
                .ok()
                .filter(is_document_value)
                .and_then(|value| serde_json::from_value::<Node>(value).ok());

            match parsed {
                Some(node) => to_markup(&node, options),
                None => ConversionResult {
                    content: markup::cleanup(&text),
                    target_format: Format::Markup,
                    warnings: vec!["input is not a structured document, passed through as markup"
                        .to_string()],
                    unsupported_kinds: BTreeSet::new(),
                    used_fallback: false,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_accepts_backend_field_names() {
        let doc: Node = serde_json::from_str(
            r#"{"type":"doc","version":1,"content":[
                {"type":"heading","attrs":{"level":1},"content":[{"type":"text","text":"T"}]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(doc.node_kind(), NodeKind::Document);
        assert_eq!(doc.children[0].node_kind(), NodeKind::Heading);
        assert_eq!(doc.children[0].attr_u64("level"), Some(1));
        assert_eq!(doc.children[0].children[0].text.as_deref(), Some("T"));
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        assert_eq!(
            NodeKind::from("customWidget"),
            NodeKind::Unknown("customWidget".to_string())
        );
    }

    #[test]
    fn test_legacy_string_document_is_converted() {
        let input = r#"{"kind":"doc","children":[{"kind":"paragraph","children":[{"kind":"text","text":"hello"}]}]}"#;
        let result = convert_content(input.into(), &ConversionOptions::default());
        assert_eq!(result.content, "hello\n\n");
        assert!(!result.used_fallback);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_legacy_markup_passes_through() {
        let result = convert_content("h1. Title  \n\n\n\nbody".into(), &ConversionOptions::default());
        assert_eq!(result.content, "h1. Title\n\nbody");
        assert_eq!(result.warnings.len(), 1);
        assert!(!result.used_fallback);
    }
}
