//! Override resolution, overlap detection and configuration assignment.
//!
//! Overlap is decided on resolved targets, never on filter syntax: two differently
//! written filters that select the same account/region pair conflict.

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::core::fanout::{expand, FanOutStrategy, ResolvedTargets, TaskSkeleton};
use crate::core::resolver::AccountResolver;
use crate::core::template::OverrideConfiguration;
use crate::core::DispatchError;

/// One pair of intersecting override blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapEntry {
    /// Index of the earlier override.
    pub first: usize,
    /// Index of the later override.
    pub second: usize,
    /// Targets both overrides resolve to.
    pub targets: Vec<TaskSkeleton>,
}

/// Every intersecting override pair in a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlapReport {
    /// Conflicting pairs, ordered by index.
    pub entries: Vec<OverlapEntry>,
}

impl OverlapReport {
    /// Whether no overlap was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for OverlapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            let targets: Vec<String> = entry.targets.iter().map(ToString::to_string).collect();
            write!(
                f,
                "overrides #{} and #{} both match [{}]",
                entry.first,
                entry.second,
                targets.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Which block a target's configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigurationSource {
    /// `DefaultConfiguration`.
    Default,
    /// `AccountOverrideConfigurations[i]`.
    Override(usize),
}

/// Resolve every override to its target set.
///
/// # Errors
///
/// [`DispatchError::MalformedFilter`] if an override filter is malformed.
pub fn resolve_overrides(
    resolver: &AccountResolver<'_>,
    overrides: &[OverrideConfiguration],
    strategy: FanOutStrategy,
) -> Result<Vec<BTreeSet<TaskSkeleton>>, DispatchError> {
    overrides
        .iter()
        .map(|entry| {
            let targets: ResolvedTargets = resolver.resolve_targets(&entry.targeting, strategy)?;
            Ok(expand(strategy, &targets)?.into_iter().collect())
        })
        .collect()
}

/// Check all override pairs for intersecting targets.
///
/// # Errors
///
/// [`DispatchError::Overlap`] listing every conflicting pair and the shared targets.
pub fn validate_overrides(resolved: &[BTreeSet<TaskSkeleton>]) -> Result<(), DispatchError> {
    let mut report = OverlapReport::default();
    for (first, a) in resolved.iter().enumerate() {
        for (second, b) in resolved.iter().enumerate().skip(first + 1) {
            let shared: Vec<TaskSkeleton> = a.intersection(b).cloned().collect();
            if !shared.is_empty() {
                report.entries.push(OverlapEntry {
                    first,
                    second,
                    targets: shared,
                });
            }
        }
    }
    if report.is_empty() {
        Ok(())
    } else {
        Err(DispatchError::Overlap(report))
    }
}

/// Pair every skeleton with exactly one configuration block.
///
/// Overrides are matched in list order; unmatched targets fall back to the default.
#[must_use]
pub fn assign_configurations(
    skeletons: Vec<TaskSkeleton>,
    resolved_overrides: &[BTreeSet<TaskSkeleton>],
) -> Vec<(TaskSkeleton, ConfigurationSource)> {
    let assigned: Vec<_> = skeletons
        .into_iter()
        .map(|skeleton| {
            let source = resolved_overrides
                .iter()
                .position(|targets| targets.contains(&skeleton))
                .map_or(ConfigurationSource::Default, ConfigurationSource::Override);
            (skeleton, source)
        })
        .collect();
    debug!(
        targets = assigned.len(),
        overridden = assigned
            .iter()
            .filter(|(_, s)| *s != ConfigurationSource::Default)
            .count(),
        "assigned configuration blocks"
    );
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[TaskSkeleton]) -> BTreeSet<TaskSkeleton> {
        items.iter().cloned().collect()
    }

    #[test]
    fn disjoint_overrides_pass() {
        let a = set(&[TaskSkeleton::account_region("1", "r1")]);
        let b = set(&[TaskSkeleton::account_region("1", "r2")]);
        assert!(validate_overrides(&[a, b]).is_ok());
        assert!(validate_overrides(&[]).is_ok());
    }

    #[test]
    fn overlap_reports_shared_targets() {
        let a = set(&[
            TaskSkeleton::account_region("1", "r1"),
            TaskSkeleton::account_region("2", "r1"),
        ]);
        let b = set(&[TaskSkeleton::account_region("2", "r1")]);
        let c = set(&[TaskSkeleton::account_region("3", "r1")]);
        let Err(DispatchError::Overlap(report)) = validate_overrides(&[a, b, c]) else {
            panic!("expected overlap");
        };
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].first, 0);
        assert_eq!(report.entries[0].second, 1);
        assert_eq!(report.entries[0].targets, vec![TaskSkeleton::account_region("2", "r1")]);
        assert_eq!(report.to_string(), "overrides #0 and #1 both match [2/r1]");
    }

    #[test]
    fn unmatched_targets_use_default() {
        let skeletons = vec![
            TaskSkeleton::account_region("A", "r1"),
            TaskSkeleton::account_region("B", "r1"),
            TaskSkeleton::account_region("B", "r2"),
        ];
        let overrides = vec![set(&[TaskSkeleton::account_region("B", "r1")])];
        let assigned = assign_configurations(skeletons, &overrides);
        assert_eq!(assigned[0].1, ConfigurationSource::Default);
        assert_eq!(assigned[1].1, ConfigurationSource::Override(0));
        assert_eq!(assigned[2].1, ConfigurationSource::Default);
    }
}
