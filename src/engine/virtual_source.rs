//! Resolution of virtual sources into their leaves, and aggregation of the
//! leaves' latest readings.

use std::collections::{BTreeMap, HashSet};

use futures::future::try_join_all;
use tracing::{debug, warn};

use super::DerivationError;
use crate::domain::{PropertyError, Reading, Source};
use crate::repo::Repository;

/// Look `name` up and resolve it into its leaves.
pub async fn descendants(repo: &dyn Repository, name: &str) -> Result<Vec<Source>, DerivationError> {
    let root = repo
        .get_source(name)
        .await?
        .ok_or_else(|| DerivationError::UnknownSource(name.to_string()))?;
    resolve_leaves(repo, &root).await
}

/// Non-virtual descendants of `root`, depth first in declaration order.
///
/// A leaf resolves to itself. A leaf reachable along two branches appears
/// once per branch. A child already on the current path fails with
/// `CycleDetected`.
pub async fn resolve_leaves(repo: &dyn Repository, root: &Source) -> Result<Vec<Source>, DerivationError> {
    if !root.is_virtual {
        return Ok(vec![root.clone()]);
    }

    let mut leaves = Vec::new();
    // (virtual source, index of the next child to visit)
    let mut stack: Vec<(Source, usize)> = vec![(root.clone(), 0)];
    let mut on_path: HashSet<String> = HashSet::from([root.name.clone()]);

    while let Some((node, next)) = stack.last_mut() {
        let Some(child_name) = node.subsources.get(*next).cloned() else {
            on_path.remove(&node.name);
            stack.pop();
            continue;
        };
        *next += 1;

        if on_path.contains(&child_name) {
            let mut path: Vec<String> = stack.iter().map(|(s, _)| s.name.clone()).collect();
            path.push(child_name);
            return Err(DerivationError::CycleDetected { path });
        }

        let child = repo
            .get_source(&child_name)
            .await?
            .ok_or_else(|| DerivationError::UnknownSource(child_name.clone()))?;

        if child.is_virtual {
            on_path.insert(child.name.clone());
            stack.push((child, 0));
        } else {
            leaves.push(child);
        }
    }

    debug!(source = %root.name, leaves = leaves.len(), "resolved virtual source");
    Ok(leaves)
}

/// Most recent reading of `source`. For a virtual source the leaves' latest
/// readings are combined with [`combine_latest`]; leaves without data are
/// skipped.
pub async fn latest(repo: &dyn Repository, source: &Source) -> Result<Option<Reading>, DerivationError> {
    if !source.is_virtual {
        return Ok(repo.latest_reading(&source.name).await?);
    }

    let leaves = resolve_leaves(repo, source).await?;
    let found = try_join_all(leaves.iter().map(|leaf| repo.latest_reading(&leaf.name))).await?;

    let readings: Vec<Reading> = leaves
        .iter()
        .zip(found)
        .filter_map(|(leaf, reading)| {
            if reading.is_none() {
                warn!(source = %source.name, leaf = %leaf.name, "leaf has no readings, skipped");
            }
            reading
        })
        .collect();

    combine_latest(&source.name, &readings)
}

/// Merge leaf readings into one synthesized reading for `source`.
///
/// The timestamp is the earliest of the inputs, so every contributing leaf
/// has data up to it. Properties are the union of all keys, with values
/// present on several leaves summed. Returns `None` for no input.
pub fn combine_latest(source: &str, readings: &[Reading]) -> Result<Option<Reading>, DerivationError> {
    let Some(earliest) = readings.iter().map(|r| r.timestamp).min() else {
        return Ok(None);
    };

    // key -> (first raw value, every raw value seen)
    let mut merged: BTreeMap<&str, (&str, Vec<&str>)> = BTreeMap::new();
    for reading in readings {
        for (key, raw) in reading.properties.iter() {
            merged.entry(key).or_insert((raw, Vec::new())).1.push(raw);
        }
    }

    let mut combined = Reading::derived(source, earliest, true);
    for (key, (first, values)) in merged {
        if values.len() == 1 {
            combined.properties.insert(key, first);
            continue;
        }
        let mut sum = 0.0;
        for raw in values {
            sum += raw.trim().parse::<f64>().map_err(|_| PropertyError::Unparseable {
                key: key.to_string(),
                value: raw.to_string(),
            })?;
        }
        combined.properties.insert(key, sum);
    }
    Ok(Some(combined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{POWER_CONSUMED, POWER_GENERATED};
    use crate::engine::straddle::fixtures::{at, reading};
    use crate::repo::MemoryRepository;

    async fn store(repo: &MemoryRepository, sources: Vec<Source>) {
        for s in sources {
            repo.store_source(&s, false).await.unwrap();
        }
    }

    fn names(sources: &[Source]) -> Vec<&str> {
        sources.iter().map(|s| s.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_leaf_resolves_to_itself() {
        let repo = MemoryRepository::new();
        store(&repo, vec![Source::leaf("a", "alice")]).await;
        assert_eq!(names(&descendants(&repo, "a").await.unwrap()), vec!["a"]);
    }

    #[tokio::test]
    async fn test_nested_virtual_sources_flatten_in_order() {
        let repo = MemoryRepository::new();
        store(
            &repo,
            vec![
                Source::leaf("a", "alice"),
                Source::leaf("b", "alice"),
                Source::leaf("c", "alice"),
                Source::composite("wing", "alice", ["b", "c"]),
                Source::composite("building", "alice", ["a", "wing"]),
                Source::composite("campus", "alice", ["building", "c"]),
            ],
        )
        .await;

        let leaves = descendants(&repo, "campus").await.unwrap();
        assert_eq!(names(&leaves), vec!["a", "b", "c", "c"]);
    }

    #[tokio::test]
    async fn test_cycle_is_detected() {
        let repo = MemoryRepository::new();
        store(
            &repo,
            vec![
                Source::leaf("a", "alice"),
                Source::composite("x", "alice", ["a", "y"]),
                Source::composite("y", "alice", ["x"]),
            ],
        )
        .await;

        match descendants(&repo, "x").await.unwrap_err() {
            DerivationError::CycleDetected { path } => assert_eq!(path, vec!["x", "y", "x"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_dangling_child_is_unknown() {
        let repo = MemoryRepository::new();
        store(&repo, vec![Source::composite("x", "alice", ["ghost"])]).await;
        assert!(matches!(
            descendants(&repo, "x").await,
            Err(DerivationError::UnknownSource(name)) if name == "ghost"
        ));
        assert!(matches!(
            descendants(&repo, "nope").await,
            Err(DerivationError::UnknownSource(_))
        ));
    }

    #[test]
    fn test_combine_latest_sums_and_takes_earliest() {
        let a = reading("a", 36_000, &[(POWER_CONSUMED, 50.0), (POWER_GENERATED, 5.0)]);
        let b = reading("b", 36_300, &[(POWER_CONSUMED, 80.0)])
            .with_property("firmware", "2.1");

        let combined = combine_latest("site", &[a, b]).unwrap().unwrap();
        assert_eq!(combined.timestamp, at(36_000));
        assert_eq!(combined.source, "site");
        assert!(combined.is_derived());
        assert_eq!(combined.value(POWER_CONSUMED).unwrap(), Some(130.0));
        assert_eq!(combined.value(POWER_GENERATED).unwrap(), Some(5.0));
        assert_eq!(combined.properties.get("firmware"), Some("2.1"));
    }

    #[test]
    fn test_combine_latest_rejects_shared_text_property() {
        let a = reading("a", 0, &[]).with_property("firmware", "v2.1");
        let b = reading("b", 0, &[]).with_property("firmware", "v2.2");
        assert!(matches!(
            combine_latest("site", &[a, b]),
            Err(DerivationError::Property(PropertyError::Unparseable { .. }))
        ));
        assert!(combine_latest("site", &[]).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_skips_leaves_without_data() {
        let repo = MemoryRepository::new();
        store(
            &repo,
            vec![
                Source::leaf("a", "alice"),
                Source::leaf("b", "alice"),
                Source::composite("site", "alice", ["a", "b"]),
            ],
        )
        .await;
        repo.store_reading(&reading("a", 0, &[(POWER_CONSUMED, 1.0)]))
            .await
            .unwrap();
        repo.store_reading(&reading("a", 60, &[(POWER_CONSUMED, 2.0)]))
            .await
            .unwrap();

        let site = repo.get_source("site").await.unwrap().unwrap();
        let combined = latest(&repo, &site).await.unwrap().unwrap();
        assert_eq!(combined.timestamp, at(60));
        assert_eq!(combined.value(POWER_CONSUMED).unwrap(), Some(2.0));
    }
}
