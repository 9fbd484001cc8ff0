//! Fan-out strategies and expansion of resolved targets into task skeletons.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use crate::core::account::{AccountId, Region};
use crate::core::DispatchError;

/// How many tasks a template expands into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FanOutStrategy {
    /// Exactly one task, no account context.
    #[serde(alias = "SINGLE_INVOCATION")]
    Single,
    /// One task per resolved account.
    Account,
    /// One task per resolved account and region pair.
    AccountRegion,
}

impl FanOutStrategy {
    /// Whether templates for this strategy carry account filters.
    #[must_use]
    pub const fn is_account_scoped(self) -> bool {
        !matches!(self, Self::Single)
    }

    /// Whether templates for this strategy carry region filters.
    #[must_use]
    pub const fn is_region_scoped(self) -> bool {
        matches!(self, Self::AccountRegion)
    }

    /// Label used in logs and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::Account => "ACCOUNT",
            Self::AccountRegion => "ACCOUNT_REGION",
        }
    }
}

impl std::fmt::Display for FanOutStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the resolver, shaped by the worker's strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTargets {
    /// No account context (SINGLE workers never consult the resolver).
    Unscoped,
    /// Resolved accounts.
    Accounts(BTreeSet<AccountId>),
    /// Resolved accounts with their allowed regions.
    AccountRegions(BTreeMap<AccountId, BTreeSet<Region>>),
}

impl ResolvedTargets {
    /// Whether there is nothing to fan out to.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Unscoped => false,
            Self::Accounts(accounts) => accounts.is_empty(),
            Self::AccountRegions(pairs) => pairs.values().all(BTreeSet::is_empty),
        }
    }

    /// Short name of the variant for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unscoped => "unscoped",
            Self::Accounts(_) => "account",
            Self::AccountRegions(_) => "account/region",
        }
    }
}

/// Account/region context of one task before rendering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskSkeleton {
    /// Target account, absent for SINGLE.
    pub account_id: Option<AccountId>,
    /// Target region, present only for ACCOUNT_REGION.
    pub region: Option<Region>,
}

impl TaskSkeleton {
    /// Skeleton without account context.
    #[must_use]
    pub const fn unscoped() -> Self {
        Self {
            account_id: None,
            region: None,
        }
    }

    /// Skeleton for one account.
    pub fn account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            region: None,
        }
    }

    /// Skeleton for one account and region.
    pub fn account_region(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            region: Some(region.into()),
        }
    }
}

impl std::fmt::Display for TaskSkeleton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.account_id, &self.region) {
            (Some(account), Some(region)) => write!(f, "{account}/{region}"),
            (Some(account), None) => f.write_str(account),
            _ => f.write_str("-"),
        }
    }
}

/// Expand resolved targets into one skeleton per task, ordered by account then region.
///
/// SINGLE always yields exactly one skeleton. Accounts with no allowed regions contribute
/// nothing under ACCOUNT_REGION.
///
/// # Errors
///
/// [`DispatchError::Config`] if `targets` lack the context `strategy` needs, such as
/// unscoped targets for ACCOUNT or accounts without regions for ACCOUNT_REGION.
pub fn expand(
    strategy: FanOutStrategy,
    targets: &ResolvedTargets,
) -> Result<Vec<TaskSkeleton>, DispatchError> {
    match (strategy, targets) {
        (FanOutStrategy::Single, _) => Ok(vec![TaskSkeleton::unscoped()]),
        (FanOutStrategy::Account, ResolvedTargets::Accounts(accounts)) => {
            Ok(accounts.iter().map(TaskSkeleton::account).collect())
        }
        (FanOutStrategy::Account, ResolvedTargets::AccountRegions(pairs)) => {
            Ok(pairs.keys().map(TaskSkeleton::account).collect())
        }
        (FanOutStrategy::AccountRegion, ResolvedTargets::AccountRegions(pairs)) => Ok(pairs
            .iter()
            .flat_map(|(account, regions)| {
                regions
                    .iter()
                    .map(move |region| TaskSkeleton::account_region(account, region))
            })
            .collect()),
        (strategy, targets) => Err(DispatchError::Config(format!(
            "{strategy} cannot expand {} targets",
            targets.kind()
        ))),
    }
}
