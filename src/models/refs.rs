//! Foreign-key reference normalization.
//!
//! Grist exports encode the same logical reference in many shapes depending on
//! the export path: plain integers, floats, digit strings, JSON strings,
//! `{"id": ..}` records, `[id, label]` pairs or `["L", 1, 2]` lists. Every join
//! in the model builder goes through this module so no other code has to
//! branch on the raw cell type.
//!
//! Resolution is total: malformed input resolves to "no reference", never to an
//! error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// Keys checked, in order, when a reference is encoded as a record.
pub const ID_FIELD_ALIASES: [&str; 4] = ["id", "rowId", "record", "value"];

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// A normalized reference value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RefValue {
    /// No usable reference.
    Absent,
    /// A single positive row id.
    Id(i64),
    /// An ordered list of positive row ids.
    List(Vec<i64>),
}

impl RefValue {
    /// Resolve a cell holding a single reference.
    pub fn single(value: &Value) -> Self {
        match resolve_ref(value) {
            Some(id) => RefValue::Id(id),
            None => RefValue::Absent,
        }
    }

    /// Resolve a cell holding a reference list.
    pub fn list(value: &Value) -> Self {
        let ids = resolve_ref_list(value);
        if ids.is_empty() {
            RefValue::Absent
        } else {
            RefValue::List(ids)
        }
    }

    /// First id carried by this reference, if any.
    pub fn first(&self) -> Option<i64> {
        match self {
            RefValue::Absent => None,
            RefValue::Id(id) => Some(*id),
            RefValue::List(ids) => ids.first().copied(),
        }
    }

    /// All ids carried by this reference, in order.
    pub fn ids(&self) -> Vec<i64> {
        match self {
            RefValue::Absent => Vec::new(),
            RefValue::Id(id) => vec![*id],
            RefValue::List(ids) => ids.clone(),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, RefValue::Absent)
    }
}

fn positive(id: i64) -> Option<i64> {
    (id > 0).then_some(id)
}

fn from_float(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let truncated = f.trunc();
    if truncated < 1.0 || truncated > i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

fn from_number(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return positive(i);
    }
    if n.as_u64().is_some() {
        // Larger than any row id Grist can produce.
        return None;
    }
    n.as_f64().and_then(from_float)
}

fn parse_digits(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().and_then(positive)
}

fn looks_like_json(s: &str) -> bool {
    s.starts_with('{') || s.starts_with('[')
}

/// Resolve a raw cell into a single positive row id.
///
/// Precedence: null/empty, bool, number, record, list (first element), then
/// string (all digits, embedded JSON, first digit run).
pub fn resolve_ref(value: &Value) -> Option<i64> {
    match value {
        Value::Null => None,
        Value::Bool(_) => None,
        Value::Number(n) => from_number(n),
        Value::Object(map) => ID_FIELD_ALIASES
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(resolve_ref),
        Value::Array(items) => items.first().and_then(resolve_ref),
        Value::String(raw) => resolve_str(raw),
    }
}

fn resolve_str(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return parse_digits(s);
    }
    if looks_like_json(s) {
        if let Ok(parsed) = serde_json::from_str::<Value>(s) {
            return resolve_ref(&parsed);
        }
    }
    DIGITS.find(s).and_then(|m| parse_digits(m.as_str()))
}

/// Resolve a raw cell into an ordered list of positive row ids.
///
/// Invalid entries are dropped; the order of valid entries is preserved.
pub fn resolve_ref_list(value: &Value) -> Vec<i64> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter_map(resolve_ref).collect(),
        Value::String(raw) => {
            let s = raw.trim();
            if s.is_empty() {
                return Vec::new();
            }
            if s.starts_with('[') {
                if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(s) {
                    return items.iter().filter_map(resolve_ref).collect();
                }
            }
            DIGITS
                .find_iter(s)
                .filter_map(|m| parse_digits(m.as_str()))
                .collect()
        }
        other => resolve_ref(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_and_empty_are_absent() {
        assert_eq!(resolve_ref(&Value::Null), None);
        assert_eq!(resolve_ref(&json!("")), None);
        assert_eq!(resolve_ref(&json!("   ")), None);
        assert_eq!(resolve_ref(&json!([])), None);
        assert_eq!(resolve_ref(&json!({})), None);
    }

    #[test]
    fn test_bools_are_never_ids() {
        assert_eq!(resolve_ref(&json!(true)), None);
        assert_eq!(resolve_ref(&json!(false)), None);
        assert_eq!(resolve_ref(&json!([true, 3])), None);
    }

    #[test]
    fn test_numbers_truncate_and_require_positive() {
        assert_eq!(resolve_ref(&json!(7)), Some(7));
        assert_eq!(resolve_ref(&json!(7.9)), Some(7));
        assert_eq!(resolve_ref(&json!(0)), None);
        assert_eq!(resolve_ref(&json!(-4)), None);
        assert_eq!(resolve_ref(&json!(0.5)), None);
        assert_eq!(resolve_ref(&json!(u64::MAX)), None);
    }

    #[test]
    fn test_record_aliases_in_order() {
        assert_eq!(resolve_ref(&json!({"id": 3})), Some(3));
        assert_eq!(resolve_ref(&json!({"rowId": "12"})), Some(12));
        assert_eq!(resolve_ref(&json!({"value": 4, "record": 9})), Some(9));
        assert_eq!(resolve_ref(&json!({"label": 5})), None);
    }

    #[test]
    fn test_list_uses_first_element() {
        assert_eq!(resolve_ref(&json!([8, "Team Alpha"])), Some(8));
        assert_eq!(resolve_ref(&json!(["x", 8])), None);
    }

    #[test]
    fn test_strings() {
        assert_eq!(resolve_ref(&json!(" 42 ")), Some(42));
        assert_eq!(resolve_ref(&json!("0")), None);
        assert_eq!(resolve_ref(&json!("{\"id\": 5}")), Some(5));
        assert_eq!(resolve_ref(&json!("[6, \"x\"]")), Some(6));
        assert_eq!(resolve_ref(&json!("Equipes[17]")), Some(17));
        assert_eq!(resolve_ref(&json!("{broken 9")), Some(9));
        assert_eq!(resolve_ref(&json!("no digits")), None);
    }

    #[test]
    fn test_nested_combinations_never_panic() {
        let inputs = [
            json!([[[{"id": [{"rowId": "3"}]}]]]),
            json!({"id": {"id": {"id": null}}}),
            json!([null, 1]),
            json!("[[[[[["),
            json!({"record": [true]}),
            json!(-0.0),
            json!(1e300),
        ];
        for input in &inputs {
            if let Some(id) = resolve_ref(input) {
                assert!(id > 0);
            }
            assert!(resolve_ref_list(input).iter().all(|id| *id > 0));
        }
        assert_eq!(resolve_ref(&inputs[0]), Some(3));
    }

    #[test]
    fn test_canonical_ids_are_stable() {
        for raw in [json!(5), json!("5"), json!(5.2), json!({"id": 5})] {
            let once = resolve_ref(&raw).unwrap();
            let twice = resolve_ref(&json!(once));
            assert_eq!(twice, Some(once));
        }
    }

    #[test]
    fn test_list_resolution() {
        assert_eq!(resolve_ref_list(&json!([3, "x", 0, 2, {"id": 9}])), vec![3, 2, 9]);
        assert_eq!(resolve_ref_list(&json!("[\"L\", 1, 2]")), vec![1, 2]);
        assert_eq!(resolve_ref_list(&json!("L,4,5")), vec![4, 5]);
        assert_eq!(resolve_ref_list(&json!(12)), vec![12]);
        assert_eq!(resolve_ref_list(&json!(true)), Vec::<i64>::new());
        assert_eq!(resolve_ref_list(&Value::Null), Vec::<i64>::new());
        assert_eq!(resolve_ref_list(&json!("")), Vec::<i64>::new());
    }

    #[test]
    fn test_ref_value_variants() {
        assert_eq!(RefValue::single(&json!("7")), RefValue::Id(7));
        assert_eq!(RefValue::single(&json!(false)), RefValue::Absent);
        assert_eq!(RefValue::list(&json!([1, 2])), RefValue::List(vec![1, 2]));
        assert!(RefValue::list(&json!([])).is_absent());
        assert_eq!(RefValue::List(vec![4, 5]).first(), Some(4));
        assert_eq!(RefValue::Id(4).ids(), vec![4]);
    }
}
