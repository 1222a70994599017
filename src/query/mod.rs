// ABOUTME: Filter/sort/limit evaluator over a materialized list of Value maps
// ABOUTME: Ported from the source's _execute_standard_query: filter -> sort (right-to-left, stable) -> limit
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A single filter condition: either a bare scalar (equality) or a map with
/// exactly one operator key. `Operator` is tried first — any JSON object is
/// an operator condition, never a literal map to equality-match against,
/// matching the source's `isinstance(condition, dict)` dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// One of the named comparison/set operators.
    Operator(OperatorCondition),
    /// Plain equality against a scalar, list, or any non-object value.
    Equals(Value),
}

/// The operator form of a filter condition. Exactly one field is expected
/// to be set; use [`OperatorCondition::operator_count`] to check, since
/// `serde`'s flat-struct deserialization can't enforce that on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorCondition {
    /// Equal.
    #[serde(default)]
    pub eq: Option<Value>,
    /// Not equal.
    #[serde(default)]
    pub ne: Option<Value>,
    /// Greater than.
    #[serde(default)]
    pub gt: Option<Value>,
    /// Greater than or equal.
    #[serde(default)]
    pub gte: Option<Value>,
    /// Less than.
    #[serde(default)]
    pub lt: Option<Value>,
    /// Less than or equal.
    #[serde(default)]
    pub lte: Option<Value>,
    /// Member of this set.
    #[serde(default)]
    pub r#in: Option<Vec<Value>>,
    /// Not a member of this set.
    #[serde(default)]
    pub nin: Option<Vec<Value>>,
}

impl OperatorCondition {
    /// How many of the operator fields are actually set. A well-formed
    /// condition has exactly one.
    fn operator_count(&self) -> usize {
        [
            self.eq.is_some(),
            self.ne.is_some(),
            self.gt.is_some(),
            self.gte.is_some(),
            self.lt.is_some(),
            self.lte.is_some(),
            self.r#in.is_some(),
            self.nin.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

/// A query: `{filter?, sort?, limit?}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    /// Field -> condition map. Missing fields exclude the item.
    #[serde(default)]
    pub filter: Option<BTreeMap<String, Condition>>,
    /// Ordered field list; leading `-` descending, `+`/none ascending.
    /// Applied right-to-left so the last entry is primary.
    #[serde(default)]
    pub sort: Option<Vec<String>>,
    /// Non-negative result cap. Absent/`null` means unlimited.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    /// Rejects a filter where any operator-form condition sets zero or
    /// more than one operator key (e.g. `{}` or `{"gt": 5, "lt": 1}`),
    /// both of which are malformed rather than meaningful.
    ///
    /// # Errors
    ///
    /// Returns a description of the offending field.
    pub fn validate(&self) -> Result<(), String> {
        let Some(filter) = &self.filter else {
            return Ok(());
        };
        for (field, condition) in filter {
            if let Condition::Operator(op) = condition {
                let count = op.operator_count();
                if count != 1 {
                    return Err(format!(
                        "filter on {field:?} must set exactly one operator, found {count}"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Evaluate `query` against `items`, returning the filtered, sorted,
/// limited result. Deterministic for the same `(query, items)`.
#[must_use]
pub fn evaluate(query: &Query, items: &[Value]) -> Vec<Value> {
    let mut result: Vec<Value> = match &query.filter {
        Some(filter) => items
            .iter()
            .filter(|item| matches_filter(item, filter))
            .cloned()
            .collect(),
        None => items.to_vec(),
    };

    if let Some(sort_fields) = &query.sort {
        apply_sort(&mut result, sort_fields);
    }

    if let Some(limit) = query.limit {
        result.truncate(limit);
    }

    result
}

fn matches_filter(item: &Value, filter: &BTreeMap<String, Condition>) -> bool {
    filter.iter().all(|(field, condition)| {
        item.get(field)
            .is_some_and(|leaf| condition_matches(leaf, condition))
    })
}

fn condition_matches(leaf: &Value, condition: &Condition) -> bool {
    match condition {
        Condition::Equals(expected) => leaf == expected,
        Condition::Operator(op) => {
            let mut matched = true;
            if let Some(v) = &op.eq {
                matched &= leaf == v;
            }
            if let Some(v) = &op.ne {
                matched &= leaf != v;
            }
            if let Some(v) = &op.gt {
                matched &= leaf.partial_compare(v) == Some(Ordering::Greater);
            }
            if let Some(v) = &op.gte {
                matched &= matches!(
                    leaf.partial_compare(v),
                    Some(Ordering::Greater | Ordering::Equal)
                );
            }
            if let Some(v) = &op.lt {
                matched &= leaf.partial_compare(v) == Some(Ordering::Less);
            }
            if let Some(v) = &op.lte {
                matched &= matches!(leaf.partial_compare(v), Some(Ordering::Less | Ordering::Equal));
            }
            if let Some(set) = &op.r#in {
                matched &= set.contains(leaf);
            }
            if let Some(set) = &op.nin {
                matched &= !set.contains(leaf);
            }
            matched
        }
    }
}

/// Stable sort applied once per field, iterating the field list in reverse
/// so the *last* listed field ends up primary — matching the source's
/// `for field in reversed(sort_fields): data = sorted(data, key=...)`.
fn apply_sort(items: &mut [Value], sort_fields: &[String]) {
    for raw_field in sort_fields.iter().rev() {
        let (field, descending) = if let Some(stripped) = raw_field.strip_prefix('-') {
            (stripped, true)
        } else if let Some(stripped) = raw_field.strip_prefix('+') {
            (stripped, false)
        } else {
            (raw_field.as_str(), false)
        };

        items.sort_by(|a, b| {
            let ord = compare_field(a, b, field);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }
}

fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(av), Some(bv)) => av.partial_compare(bv).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(count: f64, active: bool) -> Value {
        Value::from(json!({"count": count, "active": active}))
    }

    #[test]
    fn spec_scenario_filter_sort_limit() {
        let items = vec![
            ("n".to_owned(), item(3.0, true)),
            ("m".to_owned(), item(7.0, true)),
            ("o".to_owned(), item(5.0, false)),
        ];
        let values: Vec<Value> = items.iter().map(|(_, v)| v.clone()).collect();

        let query: Query = serde_json::from_value(json!({
            "filter": {"active": true},
            "sort": ["-count"],
            "limit": 1
        }))
        .unwrap_or_else(|e| panic!("{e}"));

        let result = evaluate(&query, &values);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("count"), Some(&Value::Num(7.0)));
    }

    #[test]
    fn missing_field_excludes_item() {
        let items = vec![Value::from(json!({"a": 1}))];
        let query: Query = serde_json::from_value(json!({"filter": {"b": 1}}))
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(evaluate(&query, &items).is_empty());
    }

    #[test]
    fn sort_is_stable_and_deterministic_across_runs() {
        let items = vec![
            Value::from(json!({"a": 1, "b": 1})),
            Value::from(json!({"a": 1, "b": 2})),
        ];
        let query: Query = serde_json::from_value(json!({"sort": ["a"]})).unwrap_or_else(|e| panic!("{e}"));
        let r1 = evaluate(&query, &items);
        let r2 = evaluate(&query, &items);
        assert_eq!(r1.len(), r2.len());
        for (x, y) in r1.iter().zip(r2.iter()) {
            assert_eq!(x, y);
        }
        assert_eq!(r1[0].get("b"), Some(&Value::Num(1.0)));
    }

    #[test]
    fn validate_accepts_exactly_one_operator_key() {
        let query: Query =
            serde_json::from_value(json!({"filter": {"count": {"gt": 5}}})).unwrap_or_else(|e| panic!("{e}"));
        assert!(query.validate().is_ok());
    }

    #[test]
    fn validate_rejects_two_operator_keys() {
        let query: Query = serde_json::from_value(json!({"filter": {"count": {"gt": 5, "lt": 1}}}))
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(query.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_operator_map() {
        let query: Query =
            serde_json::from_value(json!({"filter": {"count": {}}})).unwrap_or_else(|e| panic!("{e}"));
        assert!(query.validate().is_err());
    }

    #[test]
    fn right_to_left_sort_makes_last_field_primary() {
        let items = vec![
            Value::from(json!({"a": 2, "b": 1})),
            Value::from(json!({"a": 1, "b": 2})),
            Value::from(json!({"a": 1, "b": 1})),
        ];
        let query: Query =
            serde_json::from_value(json!({"sort": ["b", "a"]})).unwrap_or_else(|e| panic!("{e}"));
        let result = evaluate(&query, &items);
        // "a" is the last-listed field, so it is primary.
        assert_eq!(result[0].get("a"), Some(&Value::Num(1.0)));
        assert_eq!(result[1].get("a"), Some(&Value::Num(1.0)));
        assert_eq!(result[2].get("a"), Some(&Value::Num(2.0)));
    }
}
