//! Identifier and string escaping for generated Cypher.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PLAIN_IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref NON_PARAM_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_]").unwrap();
}

/// Escape a label, relationship type or property key.
///
/// Plain identifiers are returned unchanged, anything else is wrapped in
/// backticks with embedded backticks doubled.
pub fn escape_identifier(name: &str) -> String {
    if PLAIN_IDENTIFIER.is_match(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Render a label set as `:A:B`.
pub fn escape_labels(labels: &[String]) -> String {
    labels
        .iter()
        .map(|l| format!(":{}", escape_identifier(l)))
        .collect()
}

/// Quote a string literal with double quotes.
pub fn escape_string(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\") // Must be first!
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t");
    format!("\"{}\"", escaped)
}

/// Turn an arbitrary base name (e.g. `this0.title`) into a valid parameter name.
pub fn sanitize_parameter_name(base: &str) -> String {
    let cleaned = NON_PARAM_CHARS.replace_all(base, "_").to_string();
    if cleaned.is_empty() {
        "param".to_string()
    } else if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("p{}", cleaned)
    } else {
        cleaned
    }
}

pub fn is_plain_identifier(name: &str) -> bool {
    PLAIN_IDENTIFIER.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("Movie"), "Movie");
        assert_eq!(escape_identifier("ACTED_IN"), "ACTED_IN");
        assert_eq!(escape_identifier("My Label"), "`My Label`");
        assert_eq!(escape_identifier("we`ird"), "`we``ird`");
        assert_eq!(escape_identifier("1abc"), "`1abc`");
    }

    #[test]
    fn test_escape_labels() {
        let labels = vec!["Movie".to_string(), "Film Item".to_string()];
        assert_eq!(escape_labels(&labels), ":Movie:`Film Item`");
        assert_eq!(escape_labels(&[]), "");
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("Forbidden"), "\"Forbidden\"");
        assert_eq!(escape_string("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(escape_string("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn test_sanitize_parameter_name() {
        assert_eq!(sanitize_parameter_name("this0.title"), "this0_title");
        assert_eq!(sanitize_parameter_name("this_update_title"), "this_update_title");
        assert_eq!(sanitize_parameter_name("0abc"), "p0abc");
        assert_eq!(sanitize_parameter_name(""), "param");
    }
}
