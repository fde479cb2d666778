//! Structural diffing of JSON-like trees and regenerated sources.
//!
//! Two strategies implement the same judging contract, selected per language
//! descriptor, so nothing in here ever branches on language identity:
//! direct mode diffs program output against canonical JSON; via-schema mode
//! diffs two generator passes line-wise for self-consistency.

use polyconf_contracts::Outcome;
use polyconf_langs::LanguageDescriptor;
use serde_json::Value;

const RENDER_LIMIT: usize = 160;

#[derive(Debug, Clone, Copy)]
pub struct DiffTolerance {
    /// A key that is explicit `null` in expected may be absent in actual.
    pub allow_missing_null: bool,
    /// Relative tolerance applied only to non-integer numbers.
    pub float_epsilon: f64,
}

impl Default for DiffTolerance {
    fn default() -> Self {
        DiffTolerance {
            allow_missing_null: false,
            float_epsilon: 1e-6,
        }
    }
}

impl DiffTolerance {
    pub fn for_language(lang: &LanguageDescriptor) -> Self {
        DiffTolerance {
            allow_missing_null: lang.allow_missing_null,
            ..DiffTolerance::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffResult {
    Equal,
    Mismatch {
        path: String,
        expected: String,
        actual: String,
    },
}

impl DiffResult {
    pub fn into_outcome(self) -> Outcome {
        match self {
            DiffResult::Equal => Outcome::Equal,
            DiffResult::Mismatch {
                path,
                expected,
                actual,
            } => Outcome::Mismatch {
                path,
                expected,
                actual,
            },
        }
    }

    fn mismatch(path: &str, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        DiffResult::Mismatch {
            path: if path.is_empty() {
                "/".to_string()
            } else {
                path.to_string()
            },
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Structural equality: objects by key set then value (member order never
/// significant), arrays element-wise in order, scalars exact except floats.
pub fn diff_values(expected: &Value, actual: &Value, tol: &DiffTolerance) -> DiffResult {
    walk("", expected, actual, tol)
}

fn walk(path: &str, expected: &Value, actual: &Value, tol: &DiffTolerance) -> DiffResult {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            for (key, exp_value) in exp {
                let child = format!("{path}/{key}");
                match act.get(key) {
                    Some(act_value) => {
                        let res = walk(&child, exp_value, act_value, tol);
                        if res != DiffResult::Equal {
                            return res;
                        }
                    }
                    None if exp_value.is_null() && tol.allow_missing_null => {}
                    None => {
                        return DiffResult::mismatch(&child, render(exp_value), "<absent>");
                    }
                }
            }
            for key in act.keys() {
                if !exp.contains_key(key) {
                    let child = format!("{path}/{key}");
                    return DiffResult::mismatch(&child, "<absent>", render(&act[key]));
                }
            }
            DiffResult::Equal
        }
        (Value::Array(exp), Value::Array(act)) => {
            for (i, exp_value) in exp.iter().enumerate() {
                let child = format!("{path}/{i}");
                match act.get(i) {
                    Some(act_value) => {
                        let res = walk(&child, exp_value, act_value, tol);
                        if res != DiffResult::Equal {
                            return res;
                        }
                    }
                    None => return DiffResult::mismatch(&child, render(exp_value), "<absent>"),
                }
            }
            if act.len() > exp.len() {
                let child = format!("{path}/{}", exp.len());
                return DiffResult::mismatch(&child, "<absent>", render(&act[exp.len()]));
            }
            DiffResult::Equal
        }
        (Value::Number(exp), Value::Number(act)) => {
            if numbers_equal(exp, act, tol.float_epsilon) {
                DiffResult::Equal
            } else {
                DiffResult::mismatch(path, exp.to_string(), act.to_string())
            }
        }
        _ => {
            if expected == actual {
                DiffResult::Equal
            } else {
                DiffResult::mismatch(path, render(expected), render(actual))
            }
        }
    }
}

fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number, epsilon: f64) -> bool {
    // Exact when both sides carry integers; tolerance only for floats.
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => {
            if x == y {
                return true;
            }
            let scale = 1.0f64.max(x.abs()).max(y.abs());
            (x - y).abs() <= epsilon * scale
        }
        _ => false,
    }
}

fn render(value: &Value) -> String {
    let mut s = value.to_string();
    if s.len() > RENDER_LIMIT {
        s.truncate(RENDER_LIMIT);
        s.push_str("...");
    }
    s
}

/// Via-schema comparison: two emitted sources, line-wise after newline
/// normalization. The first divergent line is the mismatch location.
pub fn diff_source_texts(first: &str, second: &str) -> DiffResult {
    let a: Vec<&str> = normalized_lines(first);
    let b: Vec<&str> = normalized_lines(second);

    for (i, (la, lb)) in a.iter().zip(b.iter()).enumerate() {
        if la != lb {
            return DiffResult::mismatch(
                &format!("line {}", i + 1),
                truncate_line(la),
                truncate_line(lb),
            );
        }
    }
    if a.len() != b.len() {
        let i = a.len().min(b.len());
        let (exp, act) = if a.len() > b.len() {
            (truncate_line(a[i]), "<end of file>".to_string())
        } else {
            ("<end of file>".to_string(), truncate_line(b[i]))
        };
        return DiffResult::mismatch(&format!("line {}", i + 1), exp, act);
    }
    DiffResult::Equal
}

fn normalized_lines(text: &str) -> Vec<&str> {
    text.lines().map(|l| l.trim_end_matches('\r')).collect()
}

fn truncate_line(line: &str) -> String {
    let mut s = line.to_string();
    if s.len() > RENDER_LIMIT {
        s.truncate(RENDER_LIMIT);
        s.push_str("...");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strict() -> DiffTolerance {
        DiffTolerance::default()
    }

    fn lenient_null() -> DiffTolerance {
        DiffTolerance {
            allow_missing_null: true,
            ..DiffTolerance::default()
        }
    }

    #[test]
    fn equal_trees_ignore_member_order() {
        let a = serde_json::from_str::<Value>(r#"{"x":1,"y":[{"a":true,"b":null}]}"#).unwrap();
        let b = serde_json::from_str::<Value>(r#"{"y":[{"b":null,"a":true}],"x":1}"#).unwrap();
        assert_eq!(diff_values(&a, &b, &strict()), DiffResult::Equal);
    }

    #[test]
    fn missing_null_tolerated_only_when_allowed() {
        let expected = json!({"a": null});
        let actual = json!({});
        assert_eq!(diff_values(&expected, &actual, &lenient_null()), DiffResult::Equal);

        match diff_values(&expected, &actual, &strict()) {
            DiffResult::Mismatch { path, actual, .. } => {
                assert_eq!(path, "/a");
                assert_eq!(actual, "<absent>");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn absence_of_non_null_values_always_mismatches() {
        let expected = json!({"a": 1});
        let actual = json!({});
        assert_ne!(diff_values(&expected, &actual, &lenient_null()), DiffResult::Equal);
    }

    #[test]
    fn extra_keys_in_actual_mismatch() {
        let expected = json!({});
        let actual = json!({"surprise": 1});
        match diff_values(&expected, &actual, &lenient_null()) {
            DiffResult::Mismatch { path, expected, .. } => {
                assert_eq!(path, "/surprise");
                assert_eq!(expected, "<absent>");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn array_order_is_significant() {
        let a = json!([1, 2, 3]);
        let b = json!([1, 3, 2]);
        match diff_values(&a, &b, &strict()) {
            DiffResult::Mismatch { path, .. } => assert_eq!(path, "/1"),
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn array_length_mismatch_points_past_shorter_side() {
        let a = json!([1, 2]);
        let b = json!([1, 2, 3]);
        match diff_values(&a, &b, &strict()) {
            DiffResult::Mismatch { path, expected, .. } => {
                assert_eq!(path, "/2");
                assert_eq!(expected, "<absent>");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn floats_compare_within_tolerance_integers_exactly() {
        let a = json!({"f": 0.30000000000000004, "i": 7});
        let b = json!({"f": 0.3, "i": 7});
        assert_eq!(diff_values(&a, &b, &strict()), DiffResult::Equal);

        let a = json!({"i": 7});
        let b = json!({"i": 8});
        assert_ne!(diff_values(&a, &b, &strict()), DiffResult::Equal);

        let a = json!(1.0);
        let b = json!(1.5);
        assert_ne!(diff_values(&a, &b, &strict()), DiffResult::Equal);
    }

    #[test]
    fn nested_mismatch_reports_full_path() {
        let a = json!({"outer": {"inner": [true]}});
        let b = json!({"outer": {"inner": [false]}});
        match diff_values(&a, &b, &strict()) {
            DiffResult::Mismatch { path, expected, actual } => {
                assert_eq!(path, "/outer/inner/0");
                assert_eq!(expected, "true");
                assert_eq!(actual, "false");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn type_mismatch_at_root_uses_root_path() {
        match diff_values(&json!(1), &json!("1"), &strict()) {
            DiffResult::Mismatch { path, .. } => assert_eq!(path, "/"),
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn source_diff_reports_first_divergent_line() {
        let first = "type A struct {\n\tX int\n}\n";
        let second = "type A struct {\n\tX string\n}\n";
        match diff_source_texts(first, second) {
            DiffResult::Mismatch { path, .. } => assert_eq!(path, "line 2"),
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn source_diff_normalizes_line_endings() {
        assert_eq!(
            diff_source_texts("a\r\nb\r\n", "a\nb\n"),
            DiffResult::Equal
        );
    }

    #[test]
    fn source_diff_flags_length_difference() {
        match diff_source_texts("a\n", "a\nb\n") {
            DiffResult::Mismatch { path, expected, .. } => {
                assert_eq!(path, "line 2");
                assert_eq!(expected, "<end of file>");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }
}
