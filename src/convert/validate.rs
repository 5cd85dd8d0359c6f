use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static BLOCK_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(code|panel|quote)(:[^}]*)?\}").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkupValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Default)]
struct Balance {
    opens: usize,
    closes: usize,
    depth: usize,
}

impl Balance {
    /// A token with parameters always opens; a bare one closes the
    /// innermost open block, or opens one when none is open.
    fn token(&mut self, has_params: bool) {
        if !has_params && self.depth > 0 {
            self.closes += 1;
            self.depth -= 1;
        } else {
            self.opens += 1;
            self.depth += 1;
        }
    }

    fn error(&self, name: &str) -> Option<String> {
        (self.opens != self.closes).then(|| {
            format!(
                "unbalanced {{{name}}} blocks: {} opened, {} closed",
                self.opens, self.closes
            )
        })
    }
}

/// Check that paired block macros are balanced.
///
/// Everything between a `{code...}` opener and its bare `{code}` closer is
/// literal text and is not counted. `{panel}` nests like `{code}`;
/// `{quote}` markers must come in pairs.
pub fn validate_markup(markup: &str) -> MarkupValidation {
    let mut code = Balance::default();
    let mut panel = Balance::default();
    let mut quotes = 0usize;

    for caps in BLOCK_TOKEN.captures_iter(markup) {
        let name = caps.get(1).map_or("", |m| m.as_str());
        let has_params = caps.get(2).is_some();

        if code.depth > 0 {
            if name == "code" && !has_params {
                code.token(false);
            }
            continue;
        }

        match name {
            "code" => code.token(has_params),
            "panel" => panel.token(has_params),
            _ => quotes += 1,
        }
    }

    let mut errors: Vec<String> = [code.error("code"), panel.error("panel")]
        .into_iter()
        .flatten()
        .collect();
    if quotes % 2 != 0 {
        errors.push(format!("unbalanced {{quote}} blocks: {quotes} markers"));
    }

    MarkupValidation {
        valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_blocks() {
        let markup = "{code:rust}\nx\n{code}\n{code}\ny\n{code}\n{panel:bgColor=#deebff}\n{quote}q{quote}\n{panel}";
        let validation = validate_markup(markup);
        assert!(validation.valid, "{:?}", validation.errors);
    }

    #[test]
    fn test_unbalanced_blocks() {
        let test_cases = [
            "{code:java}\nx",
            "{code}\nx\n{code}\n{code}",
            "{panel:title=x}\ntext",
            "{quote}\nopen",
        ];

        for markup in test_cases {
            let validation = validate_markup(markup);
            assert!(!validation.valid, "{markup}");
            assert_eq!(validation.errors.len(), 1, "{markup}");
        }
    }

    #[test]
    fn test_code_content_is_not_counted() {
        let test_cases = [
            "{code:none}\n{quote}\n{code}",
            "{code}\n{panel:title=x}\n{code:java}\n{code}",
            "{quote}\n{code:none}\n{quote}\n{code}\n{quote}",
        ];

        for markup in test_cases {
            let validation = validate_markup(markup);
            assert!(validation.valid, "{markup}: {:?}", validation.errors);
        }
    }

    #[test]
    fn test_plain_text_is_valid() {
        assert!(validate_markup("no macros {here}").valid);
        assert!(validate_markup("escaped \\{code\\} and \\{quote\\}").valid);
    }
}
