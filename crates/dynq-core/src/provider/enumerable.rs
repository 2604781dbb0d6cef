//! Standard sequence operators over materialized values.
//!
//! Each operator takes its input by value and its lambdas as fallible
//! closures. The in-memory provider runs composed queries with these, and
//! the evaluator runs nested collection methods with the same functions.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use dynq_types::{Grouping, Type, Value};

use super::evaluator::EvalError;

type EvalResult<T> = Result<T, EvalError>;

/// Keep items matching `predicate`.
pub fn filter(
    items: Vec<Value>,
    mut predicate: impl FnMut(&Value) -> EvalResult<bool>,
) -> EvalResult<Vec<Value>> {
    let mut result = Vec::with_capacity(items.len());
    for item in items {
        if predicate(&item)? {
            result.push(item);
        }
    }
    Ok(result)
}

/// Map each item through `selector`.
pub fn project(
    items: &[Value],
    selector: impl FnMut(&Value) -> EvalResult<Value>,
) -> EvalResult<Vec<Value>> {
    items.iter().map(selector).collect()
}

/// Map each item to a collection and concatenate the collections.
///
/// A `null` collection contributes nothing.
pub fn flatten(
    items: &[Value],
    mut collection: impl FnMut(&Value) -> EvalResult<Value>,
    mut result: impl FnMut(&Value, &Value) -> EvalResult<Value>,
) -> EvalResult<Vec<Value>> {
    let mut output = Vec::new();
    for item in items {
        let inner = collection(item)?;
        if inner.is_null() {
            continue;
        }
        let inner = inner
            .as_items()
            .ok_or_else(|| EvalError::type_error(format!("'{}' is not a collection", inner)))?;
        for element in inner {
            output.push(result(item, element)?);
        }
    }
    Ok(output)
}

/// Partition items by key, keeping groups in first-seen key order and
/// items in source order.
///
/// `1` and `1.0` are the same key; the group keeps the first one seen.
pub fn group_by(
    items: Vec<Value>,
    mut key: impl FnMut(&Value) -> EvalResult<Value>,
    mut element: impl FnMut(Value) -> EvalResult<Value>,
) -> EvalResult<Vec<Value>> {
    let mut index: HashMap<Value, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();

    for item in items {
        let k = key(&item)?;
        let canonical = k.canonical_key();
        let slot = match index.get(&canonical) {
            Some(&slot) => slot,
            None => {
                index.insert(canonical, groups.len());
                groups.push((k, Vec::new()));
                groups.len() - 1
            }
        };
        groups[slot].1.push(element(item)?);
    }

    Ok(groups
        .into_iter()
        .map(|(key, items)| Value::Group(Arc::new(Grouping::new(key, items))))
        .collect())
}

/// Stable sort by several keys; `descending[i]` flips key `i`.
///
/// Keys are computed once per item before sorting.
pub fn sort_by_keys(
    items: Vec<Value>,
    mut keys: impl FnMut(&Value) -> EvalResult<Vec<Value>>,
    descending: &[bool],
) -> EvalResult<Vec<Value>> {
    let mut keyed: Vec<(Vec<Value>, Value)> = items
        .into_iter()
        .map(|item| Ok((keys(&item)?, item)))
        .collect::<EvalResult<_>>()?;

    keyed.sort_by(|(a, _), (b, _)| {
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            let cmp = x.total_cmp(y);
            let cmp = if descending.get(i).copied().unwrap_or(false) {
                cmp.reverse()
            } else {
                cmp
            };
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    });

    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

/// Inner equality join.
///
/// Builds a hash table over the inner keys, then looks up each outer
/// item; output follows outer order, then inner order. Null keys never match,
/// numeric keys match by value.
pub fn hash_join(
    outer: &[Value],
    inner: &[Value],
    mut outer_key: impl FnMut(&Value) -> EvalResult<Value>,
    mut inner_key: impl FnMut(&Value) -> EvalResult<Value>,
    mut result: impl FnMut(&Value, &Value) -> EvalResult<Value>,
) -> EvalResult<Vec<Value>> {
    // Build phase
    let mut table: HashMap<Value, Vec<usize>> = HashMap::new();
    for (i, item) in inner.iter().enumerate() {
        let key = inner_key(item)?;
        if !key.is_null() {
            table.entry(key.canonical_key()).or_default().push(i);
        }
    }

    // Lookup phase
    let mut output = Vec::new();
    for item in outer {
        let key = outer_key(item)?;
        if let Some(matches) = table.get(&key.canonical_key()) {
            for &i in matches {
                output.push(result(item, &inner[i])?);
            }
        }
    }
    Ok(output)
}

/// Drop the first `count` items.
pub fn skip(mut items: Vec<Value>, count: usize) -> Vec<Value> {
    if count >= items.len() {
        return Vec::new();
    }
    items.drain(..count);
    items
}

/// Keep at most `count` items.
pub fn take(mut items: Vec<Value>, count: usize) -> Vec<Value> {
    items.truncate(count);
    items
}

/// Remove duplicates, keeping first occurrences. Numbers compare by value.
pub fn distinct(items: Vec<Value>) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.canonical_key()))
        .collect()
}

/// Reverse the order of items.
pub fn reverse(mut items: Vec<Value>) -> Vec<Value> {
    items.reverse();
    items
}

/// Which element a positional operator picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    First,
    Last,
    Single,
}

/// Pick one element; `or_default` returns `null` instead of failing on an
/// empty input.
pub fn element_at(items: Vec<Value>, position: Position, or_default: bool) -> EvalResult<Value> {
    if position == Position::Single && items.len() > 1 {
        return Err(EvalError::MoreThanOneElement);
    }
    let picked = match position {
        Position::First | Position::Single => items.into_iter().next(),
        Position::Last => items.into_iter().last(),
    };
    match picked {
        Some(value) => Ok(value),
        None if or_default => Ok(Value::Null),
        None => Err(EvalError::NoElements),
    }
}

/// Sum numeric values, skipping nulls.
///
/// An empty input sums to zero of `result_type`.
pub fn sum(values: &[Value], result_type: &Type) -> EvalResult<Value> {
    let mut total = match result_type {
        Type::Float => Value::Float(0.0),
        _ => Value::Int(0),
    };
    for value in values {
        total = match (&total, value) {
            (_, Value::Null) => continue,
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_add(*b).ok_or(EvalError::Overflow("Sum"))?)
            }
            (acc, v) => match (acc.as_f64(), v.as_f64()) {
                (Some(a), Some(b)) => Value::Float(a + b),
                _ => return Err(EvalError::type_error(format!("cannot sum '{}'", v))),
            },
        };
    }
    Ok(total)
}

/// Arithmetic mean of numeric values, skipping nulls.
pub fn average(values: &[Value]) -> EvalResult<Value> {
    let mut total = 0.0;
    let mut count = 0usize;
    for value in values.iter().filter(|v| !v.is_null()) {
        total += value
            .as_f64()
            .ok_or_else(|| EvalError::type_error(format!("cannot average '{}'", value)))?;
        count += 1;
    }
    if count == 0 {
        return Err(EvalError::NoElements);
    }
    Ok(Value::Float(total / count as f64))
}

/// Smallest or largest non-null value.
pub fn extreme(values: Vec<Value>, want: Ordering) -> EvalResult<Value> {
    values
        .into_iter()
        .filter(|v| !v.is_null())
        .reduce(|best, v| if v.total_cmp(&best) == want { v } else { best })
        .ok_or(EvalError::NoElements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&i| Value::Int(i)).collect()
    }

    #[test]
    fn test_stable_multi_key_sort() {
        let rows: Vec<Value> = vec![(1, "b"), (2, "a"), (1, "a"), (2, "b"), (1, "a")]
            .into_iter()
            .enumerate()
            .map(|(i, (k, s))| Value::Array(vec![Value::Int(k), s.into(), Value::Int(i as i64)]))
            .collect();

        let sorted = sort_by_keys(
            rows,
            |row| Ok(row.as_items().map(|r| r[..2].to_vec()).unwrap_or_default()),
            &[false, true],
        )
        .unwrap();

        let order: Vec<i64> = sorted
            .iter()
            .filter_map(|r| r.as_items().and_then(|r| r[2].as_i64()))
            .collect();
        // Key 1 first, then name descending, ties kept in source order
        assert_eq!(order, vec![0, 2, 4, 3, 1]);
    }

    #[test]
    fn test_group_by_first_seen_order() {
        let groups = group_by(ints(&[3, 1, 3, 2, 1]), |v| Ok(v.clone()), Ok).unwrap();
        let keys: Vec<&Value> = groups.iter().filter_map(|g| g.as_group()).map(|g| &g.key).collect();
        assert_eq!(keys, vec![&Value::Int(3), &Value::Int(1), &Value::Int(2)]);
        assert_eq!(groups[0].as_items().map(|i| i.len()), Some(2));
    }

    #[test]
    fn test_hash_join_inner_semantics() {
        let outer = ints(&[1, 2, 3]);
        let inner = ints(&[3, 1, 1, 4]);
        let joined = hash_join(
            &outer,
            &inner,
            |v| Ok(v.clone()),
            |v| Ok(v.clone()),
            |o, i| Ok(Value::Array(vec![o.clone(), i.clone()])),
        )
        .unwrap();
        // 2 and 4 have no partner and are dropped
        assert_eq!(joined.len(), 3);
        assert_eq!(joined[0], Value::Array(ints(&[1, 1])));
        assert_eq!(joined[2], Value::Array(ints(&[3, 3])));
    }

    #[test]
    fn test_mixed_numeric_keys_match_by_value() {
        let outer = ints(&[1, 2]);
        let inner = vec![Value::Float(2.0), Value::Float(1.0), Value::Float(1.5)];
        let joined = hash_join(
            &outer,
            &inner,
            |v| Ok(v.clone()),
            |v| Ok(v.clone()),
            |o, i| Ok(Value::Array(vec![o.clone(), i.clone()])),
        )
        .unwrap();
        assert_eq!(
            joined,
            vec![
                Value::Array(vec![Value::Int(1), Value::Float(1.0)]),
                Value::Array(vec![Value::Int(2), Value::Float(2.0)]),
            ]
        );

        let groups = group_by(vec![Value::Int(1), Value::Float(1.0), Value::Float(1.5)], |v| Ok(v.clone()), Ok)
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].as_group().map(|g| g.key.clone()), Some(Value::Int(1)));
        assert_eq!(groups[0].as_items().map(|i| i.len()), Some(2));

        assert_eq!(
            distinct(vec![Value::Float(3.0), Value::Int(3), Value::Float(3.5)]),
            vec![Value::Float(3.0), Value::Float(3.5)]
        );
    }

    #[test]
    fn test_partitioning_clamps() {
        assert_eq!(skip(ints(&[1, 2, 3]), 5), Vec::<Value>::new());
        assert_eq!(skip(ints(&[1, 2, 3]), 1), ints(&[2, 3]));
        assert_eq!(take(ints(&[1, 2, 3]), 10), ints(&[1, 2, 3]));
    }

    #[test]
    fn test_distinct_keeps_first_occurrence() {
        assert_eq!(distinct(ints(&[2, 1, 2, 3, 1])), ints(&[2, 1, 3]));
    }

    #[test]
    fn test_element_operators() {
        assert_eq!(element_at(ints(&[1, 2]), Position::Last, false).unwrap(), Value::Int(2));
        assert_eq!(element_at(vec![], Position::First, true).unwrap(), Value::Null);
        assert!(matches!(
            element_at(vec![], Position::First, false),
            Err(EvalError::NoElements)
        ));
        assert!(matches!(
            element_at(ints(&[1, 2]), Position::Single, true),
            Err(EvalError::MoreThanOneElement)
        ));
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(sum(&[], &Type::Int).unwrap(), Value::Int(0));
        assert_eq!(sum(&[], &Type::Float).unwrap(), Value::Float(0.0));
        assert_eq!(sum(&ints(&[1, 2, 3]), &Type::Int).unwrap(), Value::Int(6));
        assert!(matches!(
            sum(&ints(&[i64::MAX, 1]), &Type::Int),
            Err(EvalError::Overflow(_))
        ));
        assert_eq!(average(&ints(&[1, 2])).unwrap(), Value::Float(1.5));
        assert!(matches!(average(&[]), Err(EvalError::NoElements)));
        assert_eq!(extreme(ints(&[3, 1, 2]), Ordering::Less).unwrap(), Value::Int(1));
        assert_eq!(extreme(ints(&[3, 1, 3]), Ordering::Greater).unwrap(), Value::Int(3));
    }
}
