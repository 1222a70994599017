// ABOUTME: Encrypted-domain compute operations: search, aggregate, filter
// ABOUTME: Ported from the source's secure_compute_on_encrypted dispatch (search/aggregate/filter + unsupported-op error)
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One of the three supported encrypted-domain operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ComputeOp {
    /// Case-insensitive substring match on string leaves, stringified
    /// equality on numeric leaves.
    Search {
        /// Query text to match against each leaf.
        query: String,
    },
    /// Numeric aggregation over a named field of map-valued items.
    Aggregate {
        /// Field to aggregate.
        field: String,
        /// Aggregation function.
        operation: AggregateFn,
    },
    /// Predicate filter over a named field of map-valued items.
    Filter {
        /// Field to filter on.
        field: String,
        /// Comparison value.
        value: Value,
        /// Comparison operator.
        operator: FilterOp,
    },
}

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    /// Sum of numeric leaves.
    Sum,
    /// Arithmetic mean of numeric leaves.
    Avg,
    /// Maximum numeric leaf.
    Max,
    /// Minimum numeric leaf.
    Min,
    /// Count of items with a numeric leaf at the named field.
    Count,
}

/// Supported filter operators.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
}

/// Outcome of a compute op. Serializes to the `{"error": "..."}` shape on
/// failure, matching the source's contract for unsupported ops / malformed
/// params.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ComputeResult {
    /// Search result.
    Search {
        /// Number of matches.
        count: usize,
        /// Matching (key, value) pairs.
        matches: Vec<(String, Value)>,
    },
    /// Aggregate result, null if no numeric leaves were found.
    Aggregate {
        /// The aggregated value.
        result: Option<f64>,
    },
    /// Filter result.
    Filter {
        /// Number of items that matched.
        count: usize,
        /// Matching map-valued items, keyed by their original map key.
        filtered_data: std::collections::BTreeMap<String, Value>,
    },
    /// Error payload for unsupported operations or malformed parameters.
    Error {
        /// Human-readable reason.
        error: String,
    },
}

/// Run `op` over `items`, a decrypted collection of (key, value) pairs
/// previously recovered from one or more envelopes.
#[must_use]
pub fn run(op: &ComputeOp, items: &[(String, Value)]) -> ComputeResult {
    match op {
        ComputeOp::Search { query } => search(query, items),
        ComputeOp::Aggregate { field, operation } => aggregate(field, *operation, items),
        ComputeOp::Filter {
            field,
            value,
            operator,
        } => filter(field, value, *operator, items),
    }
}

fn search(query: &str, items: &[(String, Value)]) -> ComputeResult {
    let needle = query.to_lowercase();
    let matches: Vec<(String, Value)> = items
        .iter()
        .filter(|(_, v)| match v {
            Value::Str(s) => s.to_lowercase().contains(&needle),
            Value::Num(_) => v.stringify() == query,
            _ => false,
        })
        .cloned()
        .collect();

    ComputeResult::Search {
        count: matches.len(),
        matches,
    }
}

fn aggregate(field: &str, operation: AggregateFn, items: &[(String, Value)]) -> ComputeResult {
    let nums: Vec<f64> = items
        .iter()
        .filter_map(|(_, v)| v.get(field).and_then(Value::as_num))
        .collect();

    let result = match operation {
        AggregateFn::Sum => Some(nums.iter().sum()),
        AggregateFn::Avg => {
            if nums.is_empty() {
                None
            } else {
                Some(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        AggregateFn::Max => nums.iter().copied().fold(None, |acc, n| {
            Some(acc.map_or(n, |m: f64| m.max(n)))
        }),
        AggregateFn::Min => nums.iter().copied().fold(None, |acc, n| {
            Some(acc.map_or(n, |m: f64| m.min(n)))
        }),
        AggregateFn::Count => Some(nums.len() as f64),
    };

    ComputeResult::Aggregate { result }
}

fn filter(
    field: &str,
    value: &Value,
    operator: FilterOp,
    items: &[(String, Value)],
) -> ComputeResult {
    let filtered: std::collections::BTreeMap<String, Value> = items
        .iter()
        .filter(|(_, v)| {
            v.get(field).is_some_and(|leaf| matches_operator(leaf, value, operator))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    ComputeResult::Filter {
        count: filtered.len(),
        filtered_data: filtered,
    }
}

fn matches_operator(leaf: &Value, value: &Value, operator: FilterOp) -> bool {
    match operator {
        FilterOp::Eq => leaf == value,
        FilterOp::Neq => leaf != value,
        FilterOp::Gt => leaf.partial_compare(value) == Some(std::cmp::Ordering::Greater),
        FilterOp::Gte => matches!(
            leaf.partial_compare(value),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ),
        FilterOp::Lt => leaf.partial_compare(value) == Some(std::cmp::Ordering::Less),
        FilterOp::Lte => matches!(
            leaf.partial_compare(value),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn item(count: f64, active: bool) -> Value {
        let mut m = BTreeMap::new();
        m.insert("count".to_owned(), Value::Num(count));
        m.insert("active".to_owned(), Value::Bool(active));
        Value::Map(m)
    }

    #[test]
    fn aggregate_sum_over_named_field() {
        let items = vec![
            ("a".to_owned(), item(3.0, true)),
            ("b".to_owned(), item(7.0, true)),
        ];
        let result = run(
            &ComputeOp::Aggregate {
                field: "count".to_owned(),
                operation: AggregateFn::Sum,
            },
            &items,
        );
        match result {
            ComputeResult::Aggregate { result: Some(sum) } => assert!((sum - 10.0).abs() < f64::EPSILON),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn filter_gt_selects_matching_items() {
        let items = vec![
            ("a".to_owned(), item(3.0, true)),
            ("b".to_owned(), item(7.0, true)),
        ];
        let result = run(
            &ComputeOp::Filter {
                field: "count".to_owned(),
                value: Value::Num(5.0),
                operator: FilterOp::Gt,
            },
            &items,
        );
        match result {
            ComputeResult::Filter { count, filtered_data } => {
                assert_eq!(count, 1);
                assert!(filtered_data.contains_key("b"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let items = vec![("a".to_owned(), Value::Str("Hello World".to_owned()))];
        let result = run(
            &ComputeOp::Search {
                query: "world".to_owned(),
            },
            &items,
        );
        match result {
            ComputeResult::Search { count, .. } => assert_eq!(count, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

impl std::fmt::Debug for ComputeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", serde_json::to_string(self).unwrap_or_default())
    }
}
