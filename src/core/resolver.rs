//! Account resolution against an inventory snapshot.
//!
//! Resolution is a pure function of the snapshot and the filters. Result sets are
//! ordered collections only for reproducible logs and tests; callers must not attach
//! meaning to the order.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::core::account::{AccountId, AccountInventory, Region};
use crate::core::fanout::{FanOutStrategy, ResolvedTargets};
use crate::core::filter::{AccountFilter, RegionFilter};
use crate::core::template::Targeting;
use crate::core::DispatchError;

/// Resolves filters to concrete targets over one borrowed snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AccountResolver<'a> {
    inventory: &'a AccountInventory,
    scope: &'a BTreeSet<Region>,
}

impl<'a> AccountResolver<'a> {
    /// Create a resolver. An empty `scope` disables the process-wide region allow-list.
    #[must_use]
    pub const fn new(inventory: &'a AccountInventory, scope: &'a BTreeSet<Region>) -> Self {
        Self { inventory, scope }
    }

    /// The snapshot this resolver reads.
    #[must_use]
    pub const fn inventory(&self) -> &'a AccountInventory {
        self.inventory
    }

    /// Accounts matched by any populated criterion of `filter`.
    ///
    /// A filter with no criteria matches nothing.
    #[must_use]
    pub fn resolve_filter(&self, filter: &AccountFilter) -> BTreeSet<AccountId> {
        if filter.all_accounts {
            return self.inventory.all_accounts();
        }

        let mut matched = self.inventory.accounts_by_ids(&filter.by_ids);
        matched.extend(self.inventory.accounts_by_names(&filter.by_names));
        for tag in &filter.by_tags {
            matched.extend(self.inventory.accounts_by_tag(tag));
        }
        for unit in &filter.by_org_units {
            matched.extend(self.inventory.accounts_by_org_unit(unit));
        }
        matched
    }

    /// `include − exclude`, minus org roots unless `operate_in_org_root` is set.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MalformedFilter`] if either filter is malformed.
    pub fn resolve(
        &self,
        include: &AccountFilter,
        exclude: &AccountFilter,
        operate_in_org_root: bool,
    ) -> Result<BTreeSet<AccountId>, DispatchError> {
        include.validate_include()?;
        exclude.validate_exclude()?;

        let included = self.resolve_filter(include);
        let excluded = self.resolve_filter(exclude);
        let mut resolved: BTreeSet<AccountId> = included.difference(&excluded).cloned().collect();

        if !operate_in_org_root {
            let roots = self.inventory.org_roots();
            resolved.retain(|id| !roots.contains(id));
        }

        debug!(
            included = included.len(),
            excluded = excluded.len(),
            resolved = resolved.len(),
            "resolved account filter"
        );
        Ok(resolved)
    }

    /// Allowed regions per account.
    ///
    /// Each account's enabled regions go through the template's region filter first,
    /// and the process-wide scope is intersected with that final set.
    #[must_use]
    pub fn resolve_account_regions(
        &self,
        accounts: &BTreeSet<AccountId>,
        regions: &RegionFilter,
    ) -> BTreeMap<AccountId, BTreeSet<Region>> {
        accounts
            .iter()
            .filter_map(|id| self.inventory.account(id))
            .map(|account| {
                let mut allowed = regions.apply(&account.enabled_regions);
                if !self.scope.is_empty() {
                    allowed.retain(|r| self.scope.contains(r));
                }
                (account.id.clone(), allowed)
            })
            .collect()
    }

    /// Resolve a template's targeting into the shape the strategy expands.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MalformedFilter`] if the filters are malformed.
    pub fn resolve_targets(
        &self,
        targeting: &Targeting,
        strategy: FanOutStrategy,
    ) -> Result<ResolvedTargets, DispatchError> {
        match strategy {
            FanOutStrategy::Single => Ok(ResolvedTargets::Unscoped),
            FanOutStrategy::Account => Ok(ResolvedTargets::Accounts(self.resolve(
                &targeting.include,
                &targeting.exclude,
                targeting.operate_in_org_root,
            )?)),
            FanOutStrategy::AccountRegion => {
                let accounts = self.resolve(
                    &targeting.include,
                    &targeting.exclude,
                    targeting.operate_in_org_root,
                )?;
                Ok(ResolvedTargets::AccountRegions(
                    self.resolve_account_regions(&accounts, &targeting.regions),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account::Account;

    fn inventory() -> AccountInventory {
        AccountInventory::from_accounts([
            Account::new("111111111111", "Prod One")
                .with_tag("env", "prod")
                .with_org_unit("ou-aaaa-11111111", "Workloads")
                .with_regions(["us-east-1", "us-west-2"]),
            Account::new("222222222222", "Test Two")
                .with_tag("env", "test")
                .with_org_unit("ou-bbbb-22222222", "Sandbox")
                .with_regions(["us-east-1"]),
            Account::new("333333333333", "Shared")
                .with_tag("team", "platform")
                .with_org_unit("ou-aaaa-11111111", "Workloads")
                .with_regions(["eu-west-1", "us-east-1"]),
            Account::new("999999999999", "Management")
                .with_tag("env", "prod")
                .with_regions(["us-east-1"])
                .org_root(),
        ])
    }

    #[test]
    fn union_across_categories() {
        let inv = inventory();
        let scope = BTreeSet::new();
        let resolver = AccountResolver::new(&inv, &scope);

        let include = AccountFilter::default()
            .with_tag("env", "test")
            .with_org_units(["workloads"]);
        let resolved = resolver
            .resolve(&include, &AccountFilter::default(), false)
            .unwrap();
        assert_eq!(resolved.len(), 3);
        assert!(!resolved.contains("999999999999"));
    }

    #[test]
    fn exclusion_wins() {
        let inv = inventory();
        let scope = BTreeSet::new();
        let resolver = AccountResolver::new(&inv, &scope);

        let include = AccountFilter::default().with_ids(["111111111111", "222222222222"]);
        let exclude = AccountFilter::default().with_names(["PROD ONE"]);
        let resolved = resolver.resolve(&include, &exclude, false).unwrap();
        assert_eq!(resolved.into_iter().collect::<Vec<_>>(), vec!["222222222222"]);
    }

    #[test]
    fn org_root_needs_double_opt_in() {
        let inv = inventory();
        let scope = BTreeSet::new();
        let resolver = AccountResolver::new(&inv, &scope);
        let none = AccountFilter::default();

        let by_tag = AccountFilter::default().with_tag("env", "prod");
        assert!(!resolver.resolve(&by_tag, &none, false).unwrap().contains("999999999999"));
        assert!(resolver.resolve(&by_tag, &none, true).unwrap().contains("999999999999"));

        // Opting in without being included selects nothing extra.
        let other = AccountFilter::default().with_ids(["222222222222"]);
        assert!(!resolver.resolve(&other, &none, true).unwrap().contains("999999999999"));

        assert!(!resolver
            .resolve(&AccountFilter::all(), &none, false)
            .unwrap()
            .contains("999999999999"));
    }

    #[test]
    fn empty_include_resolves_nothing() {
        let inv = inventory();
        let scope = BTreeSet::new();
        let resolver = AccountResolver::new(&inv, &scope);
        let resolved = resolver
            .resolve(&AccountFilter::default(), &AccountFilter::default(), true)
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn malformed_filters_rejected() {
        let inv = inventory();
        let scope = BTreeSet::new();
        let resolver = AccountResolver::new(&inv, &scope);
        let bad = AccountFilter::all().with_tag("env", "prod");
        assert!(matches!(
            resolver.resolve(&bad, &AccountFilter::default(), false),
            Err(DispatchError::MalformedFilter(_))
        ));
        assert!(matches!(
            resolver.resolve(&AccountFilter::all(), &AccountFilter::all(), false),
            Err(DispatchError::MalformedFilter(_))
        ));
    }

    #[test]
    fn scope_applies_after_template_regions() {
        let inv = inventory();
        let scope: BTreeSet<Region> = ["us-east-1".to_string()].into();
        let resolver = AccountResolver::new(&inv, &scope);
        let accounts = resolver
            .resolve(&AccountFilter::all(), &AccountFilter::default(), false)
            .unwrap();

        // Template asks for eu-west-1 only; scope allows us-east-1 only.
        let regions = resolver.resolve_account_regions(&accounts, &RegionFilter::only(["eu-west-1"]));
        assert!(regions.values().all(BTreeSet::is_empty));

        let regions = resolver.resolve_account_regions(&accounts, &RegionFilter::all());
        assert!(regions
            .values()
            .all(|rs| rs.iter().all(|r| r == "us-east-1")));
        assert_eq!(regions["111111111111"].len(), 1);
    }
}
