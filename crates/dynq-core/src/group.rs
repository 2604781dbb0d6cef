//! Recursive multi-key grouping.
//!
//! [`GroupByMany`] partitions a sequence by its first key function and
//! partitions each group again by the remaining ones, producing a tree of
//! [`GroupResult`] nodes as deep as the number of key functions.
//!
//! Grouping is lazy: a level is partitioned on its first `next()` call, and
//! subgroups are only partitioned when iterated. Cloning an iterator yields
//! one that starts over and re-runs its grouping pass.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Shared key extraction function.
pub type KeyFn<T, K, E> = Arc<dyn Fn(&T) -> Result<K, E> + Send + Sync>;

/// One node of a group tree.
pub struct GroupResult<T, K, E> {
    /// Key shared by every item in the group.
    pub key: K,
    /// Number of items.
    pub count: usize,
    /// Items in source order.
    pub items: Arc<[T]>,
    /// Groups of `items` by the next key, absent at the last level.
    pub subgroups: Option<GroupByMany<T, K, E>>,
}

impl<T: fmt::Debug, K: fmt::Debug, E> fmt::Debug for GroupResult<T, K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupResult")
            .field("key", &self.key)
            .field("count", &self.count)
            .field("items", &self.items)
            .field("subgroups", &self.subgroups.is_some())
            .finish()
    }
}

enum State<T, K> {
    Pending,
    Grouped(std::vec::IntoIter<(K, Vec<T>)>),
    Done,
}

/// Lazy iterator over the groups of one tree level.
pub struct GroupByMany<T, K, E> {
    source: Arc<[T]>,
    selectors: Arc<[KeyFn<T, K, E>]>,
    depth: usize,
    state: State<T, K>,
}

impl<T, K, E> GroupByMany<T, K, E> {
    fn level(source: Arc<[T]>, selectors: Arc<[KeyFn<T, K, E>]>, depth: usize) -> Self {
        Self {
            source,
            selectors,
            depth,
            state: State::Pending,
        }
    }

    /// Items being grouped at this level.
    pub fn source(&self) -> &[T] {
        &self.source
    }

    /// Number of key functions still to apply, this level included.
    pub fn remaining_levels(&self) -> usize {
        self.selectors.len().saturating_sub(self.depth)
    }
}

impl<T, K> GroupByMany<T, K, Infallible> {
    /// Drop the `Result` wrapper when key functions cannot fail.
    pub fn infallible(self) -> impl Iterator<Item = GroupResult<T, K, Infallible>>
    where
        T: Clone,
        K: Hash + Eq + Clone,
    {
        self.map(|group| match group {
            Ok(group) => group,
            Err(never) => match never {},
        })
    }
}

impl<T, K: Hash + Eq + Clone, E> GroupByMany<T, K, E>
where
    T: Clone,
{
    fn partition_level(&self) -> Result<Vec<(K, Vec<T>)>, E> {
        let selector = &self.selectors[self.depth];
        let mut index: HashMap<K, usize> = HashMap::new();
        let mut groups: Vec<(K, Vec<T>)> = Vec::new();

        for item in self.source.iter() {
            let key = selector(item)?;
            match index.get(&key) {
                Some(&slot) => groups[slot].1.push(item.clone()),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![item.clone()]));
                }
            }
        }
        Ok(groups)
    }
}

impl<T, K, E> Iterator for GroupByMany<T, K, E>
where
    T: Clone,
    K: Hash + Eq + Clone,
{
    type Item = Result<GroupResult<T, K, E>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                State::Pending => {
                    if self.depth >= self.selectors.len() {
                        self.state = State::Done;
                        return None;
                    }
                    match self.partition_level() {
                        Ok(groups) => self.state = State::Grouped(groups.into_iter()),
                        Err(e) => {
                            self.state = State::Done;
                            return Some(Err(e));
                        }
                    }
                }
                State::Grouped(groups) => {
                    let Some((key, items)) = groups.next() else {
                        self.state = State::Done;
                        return None;
                    };
                    let items: Arc<[T]> = items.into();
                    let next = self.depth + 1;
                    let subgroups = (next < self.selectors.len())
                        .then(|| GroupByMany::level(items.clone(), self.selectors.clone(), next));
                    return Some(Ok(GroupResult {
                        key,
                        count: items.len(),
                        items,
                        subgroups,
                    }));
                }
                State::Done => return None,
            }
        }
    }
}

impl<T, K, E> Clone for GroupByMany<T, K, E> {
    fn clone(&self) -> Self {
        Self::level(self.source.clone(), self.selectors.clone(), self.depth)
    }
}

impl<T, K, E> fmt::Debug for GroupByMany<T, K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupByMany")
            .field("items", &self.source.len())
            .field("depth", &self.depth)
            .field("levels", &self.selectors.len())
            .finish()
    }
}

/// Group `source` by fallible key functions, outermost first.
///
/// The first key failure is yielded as an `Err` item and ends that level.
/// An empty selector list yields no groups.
pub fn try_group_by_many<T, K, E>(
    source: impl IntoIterator<Item = T>,
    selectors: Vec<KeyFn<T, K, E>>,
) -> GroupByMany<T, K, E> {
    let source: Arc<[T]> = source.into_iter().collect();
    GroupByMany::level(source, selectors.into(), 0)
}

/// Group `source` by key functions, outermost first.
pub fn group_by_many<T, K, F>(
    source: impl IntoIterator<Item = T>,
    selectors: Vec<F>,
) -> GroupByMany<T, K, Infallible>
where
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    let selectors = selectors
        .into_iter()
        .map(|f| -> KeyFn<T, K, Infallible> { Arc::new(move |item: &T| Ok(f(item))) })
        .collect();
    try_group_by_many(source, selectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        a: i64,
        b: &'static str,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { a: 1, b: "x" },
            Row { a: 1, b: "y" },
            Row { a: 2, b: "x" },
        ]
    }

    fn by_a(r: &Row) -> String {
        r.a.to_string()
    }

    fn by_b(r: &Row) -> String {
        r.b.to_string()
    }

    #[test]
    fn test_two_level_tree() {
        let selectors: Vec<fn(&Row) -> String> = vec![by_a, by_b];
        let top: Vec<_> = group_by_many(rows(), selectors).infallible().collect();

        let summary: Vec<(String, usize)> = top.iter().map(|g| (g.key.clone(), g.count)).collect();
        assert_eq!(summary, vec![("1".to_string(), 2), ("2".to_string(), 1)]);

        let first: Vec<(String, usize)> = top[0]
            .subgroups
            .clone()
            .unwrap()
            .infallible()
            .map(|g| (g.key, g.count))
            .collect();
        assert_eq!(first, vec![("x".to_string(), 1), ("y".to_string(), 1)]);

        let second: Vec<_> = top[1].subgroups.clone().unwrap().infallible().collect();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].key, "x");
        assert!(second[0].subgroups.is_none());
        assert_eq!(second[0].items.as_ref(), &[Row { a: 2, b: "x" }]);
    }

    #[test]
    fn test_single_level_matches_plain_grouping() {
        let selectors: Vec<fn(&Row) -> String> = vec![by_b];
        let groups: Vec<_> = group_by_many(rows(), selectors).infallible().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "x");
        assert_eq!(
            groups[0].items.as_ref(),
            &[Row { a: 1, b: "x" }, Row { a: 2, b: "x" }]
        );
        assert!(groups.iter().all(|g| g.subgroups.is_none()));
    }

    #[test]
    fn test_empty_selectors_yield_nothing() {
        let selectors: Vec<fn(&Row) -> String> = vec![];
        assert_eq!(group_by_many(rows(), selectors).count(), 0);
    }

    #[test]
    fn test_key_failure_is_reported() {
        let failing: KeyFn<Row, i64, String> = Arc::new(|r: &Row| {
            if r.b == "y" {
                Err(format!("bad row {}", r.a))
            } else {
                Ok(r.a)
            }
        });
        let mut groups = try_group_by_many(rows(), vec![failing]);
        assert_eq!(groups.next().map(|g| g.err()), Some(Some("bad row 1".to_string())));
        assert!(groups.next().is_none());
    }

    #[test]
    fn test_levels_work_with_iterator_adapters() {
        let selectors: Vec<fn(&Row) -> String> = vec![by_a, by_b];
        let (pairs, singles): (Vec<_>, Vec<_>) = group_by_many(rows(), selectors)
            .infallible()
            .partition(|g| g.count > 1);
        assert_eq!(pairs.len(), 1);
        assert_eq!(singles[0].key, "2");
        assert_eq!(pairs[0].subgroups.clone().map(|s| s.count()), Some(2));
    }

    #[test]
    fn test_clone_restarts() {
        let selectors: Vec<fn(&Row) -> String> = vec![by_a];
        let mut groups = group_by_many(rows(), selectors);
        assert!(groups.next().is_some());
        assert_eq!(groups.clone().count(), 2);
        assert_eq!(groups.count(), 1);
    }
}
