//! Composite parameter values: `(formula){initial,max}value`.
//!
//! Both the formula and the bounds block are optional, and either side of the
//! bounds may be left empty. The formula is matched by parenthesis depth so
//! `((w*1.05)+2.5)80` keeps its nested groups intact.

use serde::{Deserialize, Serialize};

/// A parameter value split into its progression parts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionValue {
    pub value: String,
    pub formula: Option<String>,
    pub initial: Option<String>,
    pub max: Option<String>,
}

impl ProgressionValue {
    /// A bare value with no progression attached.
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// Split a raw value into formula, bounds and literal value.
pub fn parse_progression_value(raw: &str) -> ProgressionValue {
    let mut rest = raw.trim();
    let mut parsed = ProgressionValue::default();

    if rest.starts_with('(') {
        if let Some(close) = matching_paren(rest) {
            let formula = rest[1..close].trim();
            if !formula.is_empty() {
                parsed.formula = Some(formula.to_string());
            }
            rest = rest[close + 1..].trim_start();
        }
    }

    if let Some(inner) = rest.strip_prefix('{') {
        if let Some(close) = inner.find('}') {
            if let Some((initial, max)) = inner[..close].split_once(',') {
                parsed.initial = non_empty(initial);
                parsed.max = non_empty(max);
                rest = &inner[close + 1..];
            }
        }
    }

    parsed.value = rest.trim().to_string();
    parsed
}

/// Inverse of [`parse_progression_value`].
pub fn format_progression_value(
    value: &str,
    formula: Option<&str>,
    initial: Option<&str>,
    max: Option<&str>,
) -> String {
    let mut out = String::new();
    if let Some(formula) = formula {
        out.push('(');
        out.push_str(formula);
        out.push(')');
    }
    if initial.is_some() || max.is_some() {
        out.push('{');
        out.push_str(initial.unwrap_or(""));
        out.push(',');
        out.push_str(max.unwrap_or(""));
        out.push('}');
    }
    out.push_str(value);
    out
}

impl std::fmt::Display for ProgressionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_progression_value(
            &self.value,
            self.formula.as_deref(),
            self.initial.as_deref(),
            self.max.as_deref(),
        ))
    }
}

/// Byte index of the `)` closing the `(` at index 0.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_syntax() {
        let parsed = parse_progression_value("(r+1){8,12}10");
        assert_eq!(parsed.formula.as_deref(), Some("r+1"));
        assert_eq!(parsed.initial.as_deref(), Some("8"));
        assert_eq!(parsed.max.as_deref(), Some("12"));
        assert_eq!(parsed.value, "10");
    }

    #[test]
    fn test_parse_nested_parentheses() {
        let parsed = parse_progression_value("((w*1.05)+2.5){60,100}80");
        assert_eq!(parsed.formula.as_deref(), Some("(w*1.05)+2.5"));
        assert_eq!(parsed.value, "80");
    }

    #[test]
    fn test_parse_open_bounds() {
        let parsed = parse_progression_value("(w+5){,100}60");
        assert_eq!(parsed.initial, None);
        assert_eq!(parsed.max.as_deref(), Some("100"));

        let parsed = parse_progression_value("{5,}7");
        assert_eq!(parsed.formula, None);
        assert_eq!(parsed.initial.as_deref(), Some("5"));
        assert_eq!(parsed.max, None);
        assert_eq!(parsed.value, "7");
    }

    #[test]
    fn test_parse_plain_and_unbalanced() {
        assert_eq!(parse_progression_value(" 42 "), ProgressionValue::plain("42"));

        let parsed = parse_progression_value("(r+1 10");
        assert_eq!(parsed.formula, None);
        assert_eq!(parsed.value, "(r+1 10");
    }

    #[test]
    fn test_format_matches_input() {
        for raw in [
            "(r+1){8,12}12",
            "((w*1.05)+2.5){60,100}80",
            "(w+5){,100}60",
            "{5,}7",
            "(r*2)4",
            "bodyweight",
        ] {
            assert_eq!(parse_progression_value(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_parse_of_formatted_value() {
        let value = ProgressionValue {
            value: "72.5".into(),
            formula: Some("w+2.5".into()),
            initial: None,
            max: Some("80".into()),
        };
        assert_eq!(parse_progression_value(&value.to_string()), value);
    }
}
