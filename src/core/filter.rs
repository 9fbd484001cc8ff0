//! Account and region filters carried by templates.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::account::{Region, Tag};
use crate::core::DispatchError;

/// Sentinel meaning "every enabled region".
pub const ALL_REGIONS: &str = "ALL";
/// Sentinel reserved for global-resource-only templates; yields no region pairs.
pub const NO_REGIONS: &str = "NONE";

/// Inclusion or exclusion criteria over the account inventory.
///
/// Populated criteria are OR-combined across categories: an account matching any id,
/// any name, any tag or any org unit is selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AccountFilter {
    /// Select every account in the snapshot. Must not be combined with other criteria.
    pub all_accounts: bool,
    /// Account ids.
    pub by_ids: BTreeSet<String>,
    /// Account names, compared case-insensitively.
    pub by_names: BTreeSet<String>,
    /// Tag pairs, compared case-insensitively.
    pub by_tags: BTreeSet<Tag>,
    /// Org unit ids or names, compared case-insensitively.
    pub by_org_units: BTreeSet<String>,
}

impl AccountFilter {
    /// Filter selecting every account.
    #[must_use]
    pub fn all() -> Self {
        Self {
            all_accounts: true,
            ..Self::default()
        }
    }

    /// Add account ids.
    #[must_use]
    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Add account names.
    #[must_use]
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add a tag pair.
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.by_tags.insert(Tag::new(name, value));
        self
    }

    /// Add org unit ids or names.
    #[must_use]
    pub fn with_org_units<I, S>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by_org_units.extend(units.into_iter().map(Into::into));
        self
    }

    /// Whether any id/name/tag/org-unit criterion is populated.
    #[must_use]
    pub fn has_criteria(&self) -> bool {
        !self.by_ids.is_empty()
            || !self.by_names.is_empty()
            || !self.by_tags.is_empty()
            || !self.by_org_units.is_empty()
    }

    /// Whether the filter selects nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.all_accounts && !self.has_criteria()
    }

    /// Check an inclusion filter.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MalformedFilter`] when `AllAccounts` is combined with any other
    /// criterion.
    pub fn validate_include(&self) -> Result<(), DispatchError> {
        if self.all_accounts && self.has_criteria() {
            return Err(DispatchError::MalformedFilter(
                "AllAccounts cannot be combined with ByIds, ByNames, ByTags or ByOrgUnits".into(),
            ));
        }
        Ok(())
    }

    /// Check an exclusion filter.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MalformedFilter`] when `AllAccounts` is set; excluding every
    /// account is never meaningful.
    pub fn validate_exclude(&self) -> Result<(), DispatchError> {
        if self.all_accounts {
            return Err(DispatchError::MalformedFilter(
                "AllAccounts is not permitted in an exclusion filter".into(),
            ));
        }
        Ok(())
    }
}

/// Regions selected by `IncludeRegions`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RegionSelection {
    /// Every region the account has enabled.
    #[default]
    All,
    /// No regions; global-resource-only templates.
    None,
    /// Only the listed regions.
    Only(BTreeSet<Region>),
}

impl RegionSelection {
    /// Parse an `IncludeRegions` list.
    ///
    /// # Errors
    ///
    /// Returns a message when a sentinel is mixed with other entries.
    pub fn parse<S: AsRef<str>>(values: &[S]) -> Result<Self, String> {
        let has_sentinel = values
            .iter()
            .any(|v| matches!(v.as_ref(), ALL_REGIONS | NO_REGIONS));
        if has_sentinel {
            if values.len() != 1 {
                return Err(format!(
                    "`{ALL_REGIONS}` and `{NO_REGIONS}` must be the only entry when present"
                ));
            }
            return Ok(if values[0].as_ref() == ALL_REGIONS {
                Self::All
            } else {
                Self::None
            });
        }
        Ok(Self::Only(
            values.iter().map(|v| v.as_ref().to_string()).collect(),
        ))
    }
}

/// Per-template region restriction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionFilter {
    /// Included regions.
    pub include: RegionSelection,
    /// Regions removed after inclusion.
    pub exclude: BTreeSet<Region>,
}

impl RegionFilter {
    /// Filter admitting every enabled region.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter admitting only the given regions.
    #[must_use]
    pub fn only<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: RegionSelection::Only(regions.into_iter().map(Into::into).collect()),
            exclude: BTreeSet::new(),
        }
    }

    /// Add excluded regions.
    #[must_use]
    pub fn excluding<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(regions.into_iter().map(Into::into));
        self
    }

    /// Apply to one account's enabled regions.
    #[must_use]
    pub fn apply(&self, enabled: &BTreeSet<Region>) -> BTreeSet<Region> {
        let included: BTreeSet<Region> = match &self.include {
            RegionSelection::All => enabled.clone(),
            RegionSelection::None => return BTreeSet::new(),
            RegionSelection::Only(regions) => enabled.intersection(regions).cloned().collect(),
        };
        included.difference(&self.exclude).cloned().collect()
    }
}
