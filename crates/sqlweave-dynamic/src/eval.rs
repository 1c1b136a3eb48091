//! Condition evaluation
//!
//! Evaluates `<if test="...">` / `<when test="...">` condition text against a
//! render context. This is a structural matcher, not a parsed grammar: the
//! expression is classified by inspecting its text, in a fixed order.
//!
//! The order matters and is part of the compatibility contract: conjunction
//! is checked before disjunction, so an expression mixing `and`/`or` without
//! grouping evaluates as a top-level conjunction of parts that may themselves
//! contain `or`. There is no operator precedence beyond that. Mapper
//! definitions written against this behavior depend on it; changing it to
//! conventional precedence would be a compatibility break, not a fix.
//!
//! Evaluation never fails. Unresolvable names behave as absent, and any
//! expression that matches none of the supported forms is simply false.

use crate::context::RenderContext;
use regex::Regex;
use serde_json::Value;
use sqlweave_core::{display_string, is_empty_value, numeric_value};
use std::sync::LazyLock;
use tracing::debug;

/// Absolute tolerance for numeric equality, absorbing floating-point
/// representation noise when integers and floats are compared.
const NUMERIC_EQ_TOLERANCE: f64 = 0.0001;

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    // Ops with two characters listed first so `>=` is not read as `>`.
    Regex::new(r"^(.+?)\s*(==|!=|>=|<=|>|<)\s*(.+?)$").unwrap()
});

/// Evaluate a condition expression against the context. Blank text is true.
pub fn evaluate(expression: &str, ctx: &RenderContext) -> bool {
    let expression = expression.trim();
    if expression.is_empty() {
        return true;
    }

    // Conjunction, checked before disjunction. `&&` wins over the word form
    // when both appear.
    if let Some(separator) = conjunction_separator(expression) {
        return expression
            .split(separator)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .all(|part| evaluate(part, ctx));
    }

    // Disjunction.
    if let Some(separator) = disjunction_separator(expression) {
        return expression
            .split(separator)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .any(|part| evaluate(part, ctx));
    }

    // Negation, but `!=` belongs to the comparison rule.
    if let Some(inner) = expression.strip_prefix('!') {
        if !expression.starts_with("!=") {
            return !evaluate(inner.trim(), ctx);
        }
    }

    // Null checks: `name != null` / `name == null`.
    if expression.contains(" != null") || expression.contains(" == null") {
        let is_not_null = expression.contains(" != null");
        let name = expression
            .replace(" != null", "")
            .replace(" == null", "");
        let is_null = !matches!(ctx.parameter(name.trim()), Some(v) if !v.is_null());
        return if is_not_null { !is_null } else { is_null };
    }

    // A bare identifier: truthy if present and non-empty; booleans pass
    // through as themselves.
    if !expression.contains(' ')
        && !expression.contains('=')
        && !expression.contains('>')
        && !expression.contains('<')
    {
        return match ctx.parameter(expression) {
            Some(Value::Bool(b)) => *b,
            Some(value) => !is_empty_value(value),
            None => false,
        };
    }

    // Binary comparison: LEFT OP RIGHT.
    if let Some(captures) = COMPARISON.captures(expression) {
        let left = resolve_value(&captures[1], ctx);
        let op = captures[2].to_string();
        let right = resolve_value(&captures[3], ctx);
        return compare(&left, &op, &right);
    }

    debug!(expression, "condition matched no supported form, treating as false");
    false
}

fn conjunction_separator(expression: &str) -> Option<&'static str> {
    if expression.contains("&&") {
        Some("&&")
    } else if expression.contains(" and ") {
        Some(" and ")
    } else {
        None
    }
}

fn disjunction_separator(expression: &str) -> Option<&'static str> {
    if expression.contains("||") {
        Some("||")
    } else if expression.contains(" or ") {
        Some(" or ")
    } else {
        None
    }
}

/// Resolve one side of a comparison: quoted literal, numeric or boolean
/// literal, the `null` keyword, or a parameter lookup (absent becomes null).
fn resolve_value(expr: &str, ctx: &RenderContext) -> Value {
    let expr = expr.trim();

    if expr.len() >= 2
        && ((expr.starts_with('\'') && expr.ends_with('\''))
            || (expr.starts_with('"') && expr.ends_with('"')))
    {
        return Value::String(expr[1..expr.len() - 1].to_string());
    }

    if let Ok(int) = expr.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = expr.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    if let Ok(boolean) = expr.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if expr.eq_ignore_ascii_case("null") {
        return Value::Null;
    }

    ctx.parameter(expr).cloned().unwrap_or(Value::Null)
}

/// Compare two resolved values under an operator.
fn compare(left: &Value, op: &str, right: &Value) -> bool {
    // Null on either side: only equality is meaningful.
    if left.is_null() || right.is_null() {
        return match op {
            "==" => left.is_null() && right.is_null(),
            "!=" => !(left.is_null() && right.is_null()),
            _ => false,
        };
    }

    // Numeric comparison when both sides are numbers. Equality is tolerant,
    // ordering is exact.
    if let (Some(l), Some(r)) = (numeric_value(left), numeric_value(right)) {
        return match op {
            "==" => (l - r).abs() < NUMERIC_EQ_TOLERANCE,
            "!=" => (l - r).abs() >= NUMERIC_EQ_TOLERANCE,
            ">" => l > r,
            "<" => l < r,
            ">=" => l >= r,
            "<=" => l <= r,
            _ => false,
        };
    }

    // String comparison: equality is case-insensitive, ordering is ordinal.
    let l = display_string(left);
    let r = display_string(right);
    match op {
        "==" => l.eq_ignore_ascii_case(&r),
        "!=" => !l.eq_ignore_ascii_case(&r),
        ">" => l > r,
        "<" => l < r,
        ">=" => l >= r,
        "<=" => l <= r,
        _ => false,
    }
}
