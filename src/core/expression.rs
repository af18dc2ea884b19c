//! Textual filter expressions such as `product == "maize" && aez_id == 46172`

use crate::core::filter::Comparison;
use crate::types::{CropError, CropResult, PropertyValue};
use regex::Regex;
use std::sync::OnceLock;

/// One parsed `property <op> literal` clause
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub property: String,
    pub op: Comparison,
    pub value: PropertyValue,
}

/// Parse a conjunction of comparison clauses.
///
/// Clauses are joined by `&&` or `and`. Literals are double- or
/// single-quoted strings (backslash escapes allowed) or decimal numbers.
pub fn parse_expression(expression: &str) -> CropResult<Vec<Clause>> {
    static CLAUSE_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    static JOIN_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    let clause_re = cached_regex(
        &CLAUSE_RE,
        r#"^\s*([A-Za-z_][A-Za-z0-9_:.]*)\s*(==|!=|<=|>=|<|>)\s*("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|[-+]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)"#,
    )?;
    let join_re = cached_regex(&JOIN_RE, r"^\s*(?:&&|and\b)")?;

    let mut clauses = Vec::new();
    let mut rest = expression;
    loop {
        let captures = clause_re
            .captures(rest)
            .ok_or_else(|| invalid(expression, rest))?;
        let property = captures[1].to_string();
        let op = Comparison::from_symbol(&captures[2]).ok_or_else(|| invalid(expression, rest))?;
        let value = parse_literal(&captures[3]);
        clauses.push(Clause { property, op, value });

        let consumed = captures.get(0).map(|m| m.end()).unwrap_or(rest.len());
        rest = &rest[consumed..];
        if rest.trim().is_empty() {
            break;
        }

        match join_re.find(rest) {
            Some(join) => rest = &rest[join.end()..],
            None => return Err(invalid(expression, rest)),
        }
    }

    log::debug!("Parsed filter expression '{}' into {} clauses", expression, clauses.len());
    Ok(clauses)
}

/// Compile `pattern` into `cell` on first use
pub(crate) fn cached_regex(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &str,
) -> CropResult<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| CropError::Processing(format!("Regex error: {}", e)))
}

fn invalid(expression: &str, rest: &str) -> CropError {
    CropError::InvalidExpression(format!(
        "'{}' (cannot parse near '{}')",
        expression,
        rest.trim()
    ))
}

fn parse_literal(literal: &str) -> PropertyValue {
    if literal.starts_with('"') || literal.starts_with('\'') {
        let inner = &literal[1..literal.len() - 1];
        let mut text = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    text.push(escaped);
                }
            } else {
                text.push(c);
            }
        }
        return PropertyValue::Text(text);
    }

    match literal.parse::<i64>() {
        Ok(int) => PropertyValue::Int(int),
        // The regex only admits decimal numbers here
        Err(_) => PropertyValue::Float(literal.parse::<f64>().unwrap_or(f64::NAN)),
    }
}
