//! Structural diff of two JSON documents
//!
//! Used to compare the details of two runs of the same scenario. Arrays are
//! walked index by index, objects key by key, and every diverging leaf is
//! reported with its path (`tests[1].status`, `meta.summary.fail`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One diverging leaf. `None` means the value is absent on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<Value>,
}

/// Diff two documents from the root
pub fn diff_values(a: &Value, b: &Value) -> Vec<DiffEntry> {
    diff(Some(a), Some(b), "")
}

/// Diff two optional values under `path`
pub fn diff(a: Option<&Value>, b: Option<&Value>, path: &str) -> Vec<DiffEntry> {
    let mut out = Vec::new();
    walk(a, b, path, &mut out);
    out
}

fn walk(a: Option<&Value>, b: Option<&Value>, path: &str, out: &mut Vec<DiffEntry>) {
    match (a, b) {
        (Some(Value::Array(left)), Some(Value::Array(right))) => {
            let max = left.len().max(right.len());
            for i in 0..max {
                walk(left.get(i), right.get(i), &format!("{}[{}]", path, i), out);
            }
        }
        (Some(Value::Object(left)), Some(Value::Object(right))) => {
            let right_only = right.keys().filter(|k| !left.contains_key(*k));
            for key in left.keys().chain(right_only) {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                walk(left.get(key), right.get(key), &child, out);
            }
        }
        _ => {
            if a != b {
                out.push(DiffEntry {
                    path: path.to_string(),
                    a: a.cloned(),
                    b: b.cloned(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_documents_have_no_diff() {
        let doc = json!({
            "steps": [{ "name": "Runner accepted job", "status": "pass" }],
            "tests": [{ "title": "a", "status": "pass", "duration_ms": 10, "error": null }],
            "meta": { "summary": { "pass": 1, "fail": 0, "total": 1 } }
        });
        assert!(diff_values(&doc, &doc).is_empty());
    }

    #[test]
    fn test_single_scalar_change() {
        let diffs = diff_values(&json!({"a": 1, "b": 2}), &json!({"a": 1, "b": 3}));
        assert_eq!(
            diffs,
            vec![DiffEntry {
                path: "b".to_string(),
                a: Some(json!(2)),
                b: Some(json!(3)),
            }]
        );
    }

    #[test]
    fn test_nested_paths() {
        let a = json!({"tests": [{"status": "pass"}, {"status": "pass"}]});
        let b = json!({"tests": [{"status": "pass"}, {"status": "fail"}]});
        let diffs = diff_values(&a, &b);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "tests[1].status");
    }

    #[test]
    fn test_shorter_array_reports_absent_side() {
        let diffs = diff_values(&json!([1, 2]), &json!([1, 2, 3]));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "[2]");
        assert_eq!(diffs[0].a, None);
        assert_eq!(diffs[0].b, Some(json!(3)));
    }

    #[test]
    fn test_key_only_on_right() {
        let diffs = diff_values(&json!({"x": 1}), &json!({"x": 1, "y": null}));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "y");
        assert_eq!(diffs[0].a, None);
        assert_eq!(diffs[0].b, Some(Value::Null));
    }

    #[test]
    fn test_shape_mismatch_is_one_leaf() {
        let diffs = diff_values(&json!({"x": [1]}), &json!({"x": {"0": 1}}));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "x");
    }

    #[test]
    fn test_absent_entries_skip_serialization() {
        let entry = DiffEntry {
            path: "y".to_string(),
            a: None,
            b: Some(json!(1)),
        };
        assert_eq!(serde_json::to_value(&entry).unwrap(), json!({"path": "y", "b": 1}));
    }
}
