use std::{collections::BTreeSet, fmt};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ConversionOptions, ConversionResult, Format, Mark, Node, NodeKind};

const TRUNCATED_PLACEHOLDER: &str = "[content truncated]";
const MEDIA_PLACEHOLDER: &str = "[media]";

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static BLOCK_MACRO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(code|panel|quote|noformat)(:[^}]*)?\}").unwrap());

/// A handler could not render its node; aborts the structured pass.
#[derive(Debug)]
struct RenderError {
    kind: String,
    reason: String,
}

impl RenderError {
    fn new(node: &Node, reason: impl Into<String>) -> Self {
        Self {
            kind: node.kind.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} node: {}", self.kind, self.reason)
    }
}

type RenderResult = Result<String, RenderError>;

/// Convert a document tree to wiki markup.
///
/// Never fails. If a handler rejects its node the tree is re-read as plain
/// text and the result is flagged with `used_fallback`.
pub fn to_markup(node: &Node, options: &ConversionOptions) -> ConversionResult {
    let mut renderer = MarkupRenderer::new(options);

    match renderer.render(node, 0) {
        Ok(raw) => ConversionResult {
            content: cleanup(&raw),
            target_format: Format::Markup,
            warnings: renderer.warnings,
            unsupported_kinds: renderer.unsupported,
            used_fallback: false,
        },
        Err(err) => {
            log::warn!("Markup conversion failed, using plain text fallback: {err}");

            let mut truncated = false;
            let raw = extract_plain(node, 0, options.max_depth, &mut truncated);

            let mut warnings = vec![format!(
                "markup conversion failed ({err}), content converted as plain text"
            )];
            if truncated {
                warnings.push(truncation_warning(options.max_depth));
            }

            ConversionResult {
                content: cleanup(&raw),
                target_format: Format::Markup,
                warnings,
                unsupported_kinds: renderer.unsupported,
                used_fallback: true,
            }
        }
    }
}

/// Final normalisation applied to every conversion output.
///
/// Collapses runs of blank lines, strips trailing blanks per line and trims
/// the document, keeping a single block terminator when the output ended
/// with one.
pub(crate) fn cleanup(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n");
    let stripped = normalized
        .split('\n')
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join("\n");
    let collapsed = BLANK_LINES.replace_all(&stripped, "\n\n");

    let ends_with_block = collapsed.ends_with('\n');
    let body = collapsed.trim();
    if body.is_empty() {
        String::new()
    } else if ends_with_block {
        format!("{body}\n\n")
    } else {
        body.to_string()
    }
}

/// Depth-first leaf text extraction, ignoring all formatting.
fn extract_plain(node: &Node, depth: usize, max_depth: usize, truncated: &mut bool) -> String {
    if depth > max_depth {
        *truncated = true;
        return TRUNCATED_PLACEHOLDER.to_string();
    }

    let kind = node.node_kind();
    if kind == NodeKind::HardBreak {
        return "\n".to_string();
    }

    let mut out = node.text.clone().unwrap_or_default();
    for child in &node.children {
        out.push_str(&extract_plain(child, depth + 1, max_depth, truncated));
    }
    if kind.is_block() {
        out.push('\n');
    }
    out
}

fn truncation_warning(max_depth: usize) -> String {
    format!("document deeper than {max_depth} levels, nested content truncated")
}

fn panel_color(panel_type: Option<&str>) -> &'static str {
    match panel_type {
        Some("note") => "#eae6ff",
        Some("success") => "#e3fcef",
        Some("warning") => "#fffae6",
        Some("error") => "#ffebe6",
        _ => "#deebff",
    }
}

/// Table cells must stay on one line.
fn flatten_cell(content: &str) -> String {
    content
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

struct MarkupRenderer<'a> {
    options: &'a ConversionOptions,
    warnings: Vec<String>,
    unsupported: BTreeSet<String>,
    truncated: bool,
}

impl<'a> MarkupRenderer<'a> {
    fn new(options: &'a ConversionOptions) -> Self {
        Self {
            options,
            warnings: Vec::new(),
            unsupported: BTreeSet::new(),
            truncated: false,
        }
    }

    /// Returns true (and records the cut) when `depth` exceeds the bound.
    fn too_deep(&mut self, depth: usize) -> bool {
        if depth <= self.options.max_depth {
            return false;
        }
        if !self.truncated {
            self.truncated = true;
            self.warnings.push(truncation_warning(self.options.max_depth));
        }
        true
    }

    fn render(&mut self, node: &Node, depth: usize) -> RenderResult {
        if self.too_deep(depth) {
            return Ok(TRUNCATED_PLACEHOLDER.to_string());
        }

        match node.node_kind() {
            NodeKind::Document | NodeKind::ListItem => self.render_children(node, depth),
            NodeKind::Paragraph => Ok(format!("{}\n\n", self.render_children(node, depth)?)),
            NodeKind::Heading => self.render_heading(node, depth),
            NodeKind::BulletList => self.render_list(node, depth, "*".to_string(), true),
            NodeKind::OrderedList => self.render_list(node, depth, "#".to_string(), true),
            NodeKind::Text => self.render_text(node),
            NodeKind::HardBreak => Ok("\n".to_string()),
            NodeKind::Link | NodeKind::InlineCard => self.render_link(node, depth),
            NodeKind::CodeBlock => Ok(render_code_block(node)),
            NodeKind::Blockquote => {
                let inner = self.render_children(node, depth)?;
                Ok(format!("{{quote}}\n{}\n{{quote}}\n\n", inner.trim()))
            }
            NodeKind::Table => self.render_table(node, depth),
            NodeKind::TableRow => self.render_row(node, depth),
            NodeKind::TableHeader | NodeKind::TableCell => self.render_children(node, depth),
            NodeKind::Rule => Ok("----\n\n".to_string()),
            NodeKind::Mention => render_mention(node),
            NodeKind::Media => Ok(media_placeholder(node)),
            NodeKind::MediaSingle | NodeKind::MediaGroup => {
                Ok(format!("{}\n\n", self.render_children(node, depth)?))
            }
            NodeKind::Panel => {
                let inner = self.render_children(node, depth)?;
                Ok(format!(
                    "{{panel:bgColor={}}}\n{}\n{{panel}}\n\n",
                    panel_color(node.attr_str("panelType")),
                    inner.trim()
                ))
            }
            NodeKind::Emoji => Ok(node
                .attr_str("shortName")
                .or_else(|| node.attr_str("text"))
                .unwrap_or_default()
                .to_string()),
            NodeKind::Unknown(kind) => Ok(self.render_unsupported(node, kind, depth)),
        }
    }

    fn render_children(&mut self, node: &Node, depth: usize) -> RenderResult {
        let mut out = String::new();
        for child in &node.children {
            out.push_str(&self.render(child, depth + 1)?);
        }
        Ok(out)
    }

    fn render_heading(&mut self, node: &Node, depth: usize) -> RenderResult {
        let level = node
            .attr_u64("level")
            .ok_or_else(|| RenderError::new(node, "missing heading level"))?;
        if !(1..=6).contains(&level) {
            return Err(RenderError::new(
                node,
                format!("heading level {level} out of range"),
            ));
        }
        let inner = self.render_children(node, depth)?;
        Ok(format!("h{level}. {}\n\n", inner.trim()))
    }

    /// `prefix` is the full marker for this nesting level, e.g. `#*`.
    fn render_list(
        &mut self,
        node: &Node,
        depth: usize,
        prefix: String,
        top_level: bool,
    ) -> RenderResult {
        if self.too_deep(depth) {
            return Ok(format!("{TRUNCATED_PLACEHOLDER}\n"));
        }

        let mut out = String::new();
        for item in &node.children {
            match item.node_kind() {
                NodeKind::ListItem => out.push_str(&self.render_list_item(item, depth + 1, &prefix)?),
                _ => {
                    let text = self.render(item, depth + 1)?;
                    out.push_str(&format!("{prefix} {}\n", text.trim()));
                }
            }
        }
        if top_level {
            out.push('\n');
        }
        Ok(out)
    }

    fn render_list_item(&mut self, item: &Node, depth: usize, prefix: &str) -> RenderResult {
        if self.too_deep(depth) {
            return Ok(format!("{prefix} {TRUNCATED_PLACEHOLDER}\n"));
        }

        let mut line = String::new();
        let mut nested = String::new();
        for child in &item.children {
            match child.node_kind() {
                NodeKind::BulletList => {
                    nested.push_str(&self.render_list(child, depth + 1, format!("{prefix}*"), false)?)
                }
                NodeKind::OrderedList => {
                    nested.push_str(&self.render_list(child, depth + 1, format!("{prefix}#"), false)?)
                }
                _ => {
                    let text = self.render(child, depth + 1)?;
                    let text = text.trim();
                    if !text.is_empty() {
                        if !line.is_empty() {
                            line.push(' ');
                        }
                        line.push_str(text);
                    }
                }
            }
        }
        Ok(format!("{prefix} {line}\n{nested}"))
    }

    fn render_text(&mut self, node: &Node) -> RenderResult {
        let text = node.text.clone().unwrap_or_default();
        if text.is_empty() {
            return Ok(text);
        }
        node.marks
            .iter()
            .try_fold(text, |acc, mark| self.apply_mark(acc, mark, node))
    }

    fn apply_mark(&mut self, text: String, mark: &Mark, node: &Node) -> RenderResult {
        let wrapped = match mark.kind.as_str() {
            "strong" => format!("*{text}*"),
            "em" => format!("_{text}_"),
            "strike" => format!("-{text}-"),
            "underline" => format!("+{text}+"),
            "sub" => format!("~{text}~"),
            "sup" => format!("^{text}^"),
            "subsup" => match mark.attr_str("type") {
                Some("sub") => format!("~{text}~"),
                Some("sup") => format!("^{text}^"),
                other => {
                    self.warnings
                        .push(format!("subsup mark with unknown type {other:?} ignored"));
                    text
                }
            },
            "code" => format!("{{{{{text}}}}}"),
            "textColor" => match mark.attr_str("color") {
                Some(color) => format!("{{color:{color}}}{text}{{color}}"),
                None => {
                    self.warnings
                        .push("textColor mark without color ignored".to_string());
                    text
                }
            },
            "link" => {
                let href = mark
                    .attr_str("href")
                    .ok_or_else(|| RenderError::new(node, "link mark without href"))?;
                format!("[{text}|{href}]")
            }
            other => {
                self.warnings.push(format!("unsupported mark '{other}' ignored"));
                text
            }
        };
        Ok(wrapped)
    }

    fn render_link(&mut self, node: &Node, depth: usize) -> RenderResult {
        let url = node
            .attr_str("url")
            .or_else(|| node.attr_str("href"))
            .ok_or_else(|| RenderError::new(node, "missing url"))?
            .to_string();
        let text = self.render_children(node, depth)?;
        let text = text.trim();

        if text.is_empty() || text == url {
            Ok(format!("[{url}]"))
        } else {
            Ok(format!("[{text}|{url}]"))
        }
    }

    fn render_table(&mut self, node: &Node, depth: usize) -> RenderResult {
        let mut out = String::new();
        for row in &node.children {
            if self.too_deep(depth + 1) {
                out.push_str(TRUNCATED_PLACEHOLDER);
                out.push('\n');
                continue;
            }
            match row.node_kind() {
                NodeKind::TableRow => out.push_str(&self.render_row(row, depth + 1)?),
                _ => {
                    let text = self.render(row, depth + 1)?;
                    out.push_str(text.trim());
                    out.push('\n');
                }
            }
        }
        out.push('\n');
        Ok(out)
    }

    fn render_row(&mut self, row: &Node, depth: usize) -> RenderResult {
        if row.children.is_empty() {
            return Ok(String::new());
        }

        let mut out = String::new();
        let mut last_separator = "|";
        for cell in &row.children {
            let separator = if cell.node_kind() == NodeKind::TableHeader {
                "||"
            } else {
                "|"
            };
            let content = self.render(cell, depth + 1)?;
            out.push_str(separator);
            out.push_str(&flatten_cell(&content));
            last_separator = separator;
        }
        out.push_str(last_separator);
        out.push('\n');
        Ok(out)
    }

    fn render_unsupported(&mut self, node: &Node, kind: String, depth: usize) -> String {
        if self.unsupported.insert(kind.clone()) {
            self.warnings.push(format!("unsupported node kind '{kind}'"));
        }

        if self.options.emit_unsupported_markers {
            return format!("[unsupported: {kind}]");
        }

        let mut truncated = false;
        let text = extract_plain(node, depth, self.options.max_depth, &mut truncated);
        if truncated {
            self.too_deep(self.options.max_depth + 1);
        }
        text
    }
}

fn render_code_block(node: &Node) -> String {
    let language = node
        .attr_str("language")
        .filter(|lang| !lang.is_empty())
        .unwrap_or("none");
    let mut code: String = node
        .children
        .iter()
        .filter_map(|child| child.text.as_deref())
        .collect();
    if let Some(text) = &node.text {
        code.push_str(text);
    }
    // a literal macro token would end the block early
    let code = BLOCK_MACRO.replace_all(code.trim_end_matches('\n'), r"\{${1}${2}\}");
    format!("{{code:{language}}}\n{code}\n{{code}}\n\n")
}

fn render_mention(node: &Node) -> RenderResult {
    let id = node
        .attr_str("id")
        .or_else(|| node.attr_str("accountId"))
        .ok_or_else(|| RenderError::new(node, "mention without id"))?;
    Ok(format!("[~accountid:{id}]"))
}

fn media_placeholder(node: &Node) -> String {
    node.attr_str("alt")
        .or_else(|| node.attr_str("filename"))
        .or_else(|| node.attr_str("id"))
        .filter(|name| !name.is_empty())
        .map(|name| format!("!{name}!"))
        .unwrap_or_else(|| MEDIA_PLACEHOLDER.to_string())
}
