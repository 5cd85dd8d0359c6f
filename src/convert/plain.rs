use once_cell::sync::Lazy;
use regex::Regex;

/// Ordered markup stripping rules, each applied once over the whole text.
static RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // headings
        (r"(?m)^h[1-6]\.\s*", ""),
        // bold
        (r"\*(\S(?:[^*\n]*\S)?)\*", "$1"),
        // italic, not inside words
        (r"(^|[^\w])_(\S(?:[^_\n]*\S)?)_", "$1$2"),
        // inline code
        (r"\{\{([^}]*)\}\}", "$1"),
        // code blocks
        (r"(?s)\{code(?::[^}]*)?\}(.*?)\{code\}", "$1"),
        // quotes
        (r"(?s)\{quote\}(.*?)\{quote\}", "$1"),
        // panels
        (r"(?s)\{panel(?::[^}]*)?\}(.*?)\{panel\}", "$1"),
        // bullet markers, including mixed nesting like `#*`
        (r"(?m)^[ \t]*(?:[*#]*\*[*#]*|-+)[ \t]+", ""),
        // numbered markers
        (r"(?m)^[ \t]*#+[ \t]+", ""),
        // links with text
        (r"\[([^|\]\n]+)\|([^\]\n]+)\]", "$1"),
        // bare links
        (r"\[([^~\]\n|][^\]\n|]*)\]", "$1"),
        // mentions
        (r"\[~(?:accountid:)?([^\]]+)\]", "@$1"),
        // horizontal rules
        (r"(?m)^-{4,}[ \t]*$", ""),
        // color spans
        (r"\{color(?::[^}]*)?\}", ""),
        // escaped macro braces
        (r"\\([{}])", "$1"),
        // table cell separators
        (r"\|{1,2}", " "),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

static INNER_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strip wiki markup down to readable plain text.
pub fn to_plain_text(markup: &str) -> String {
    let mut text = markup.replace("\r\n", "\n");
    for (pattern, replacement) in RULES.iter() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }

    let lines = text
        .split('\n')
        .map(|line| INNER_SPACES.replace_all(line.trim(), " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n");

    BLANK_LINES.replace_all(&lines, "\n\n").trim().to_string()
}
