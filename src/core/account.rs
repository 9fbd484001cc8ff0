//! Account records and the point-in-time inventory snapshot.
//!
//! An [`AccountInventory`] is built once per load from the inventory document and is
//! immutable afterwards. Resolution borrows a single snapshot for its whole duration,
//! so two generations of the inventory are never blended.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::DispatchError;

/// Stable account identifier.
pub type AccountId = String;

/// Region identifier, e.g. `us-east-1`.
pub type Region = String;

/// A tag name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    /// Tag name.
    pub name: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Create a tag pair.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    fn folded(&self) -> (String, String) {
        (self.name.to_lowercase(), self.value.to_lowercase())
    }
}

/// An organizational unit the account sits under (directly or transitively).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrgUnit {
    /// Unit identifier (`ou-…` or `r-…` for the root).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Unit type as reported by the generator (`ROOT`, `ORGANIZATIONAL_UNIT`).
    #[serde(default, rename = "Type")]
    pub kind: Option<String>,
}

/// Immutable account record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Account identifier.
    pub id: AccountId,
    /// Display name; matched case-insensitively.
    pub name: String,
    /// Account tags.
    pub tags: BTreeSet<Tag>,
    /// Ancestor org units, including the direct parent.
    pub org_units: BTreeSet<OrgUnit>,
    /// Regions enabled for the account.
    pub enabled_regions: BTreeSet<Region>,
    /// Whether this is an organization root (management) account.
    pub is_org_root: bool,
}

impl Account {
    /// Minimal account with no tags, units or regions.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tags: BTreeSet::new(),
            org_units: BTreeSet::new(),
            enabled_regions: BTreeSet::new(),
            is_org_root: false,
        }
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(Tag::new(name, value));
        self
    }

    /// Add an org unit ancestor.
    #[must_use]
    pub fn with_org_unit(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.org_units.insert(OrgUnit {
            id: id.into(),
            name: name.into(),
            kind: None,
        });
        self
    }

    /// Add enabled regions.
    #[must_use]
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_regions.extend(regions.into_iter().map(Into::into));
        self
    }

    /// Mark as an organization root.
    #[must_use]
    pub const fn org_root(mut self) -> Self {
        self.is_org_root = true;
        self
    }
}

/// One entry of the inventory document, keyed by account id.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InventoryRecord {
    name: String,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    parents: Vec<OrgUnit>,
    #[serde(default)]
    regions: Vec<String>,
    #[serde(default)]
    is_org_root: bool,
}

/// Point-in-time account inventory with lookup indexes.
#[derive(Debug, Clone, Default)]
pub struct AccountInventory {
    accounts: BTreeMap<AccountId, Account>,
    names: HashMap<String, BTreeSet<AccountId>>,
    org_units: HashMap<String, BTreeSet<AccountId>>,
    tags: HashMap<(String, String), BTreeSet<AccountId>>,
    regions: BTreeMap<Region, BTreeSet<AccountId>>,
    org_roots: BTreeSet<AccountId>,
}

impl AccountInventory {
    /// Build the snapshot and its indexes from account records.
    ///
    /// A later record with a duplicate id replaces the earlier one.
    pub fn from_accounts<I>(accounts: I) -> Self
    where
        I: IntoIterator<Item = Account>,
    {
        let accounts: BTreeMap<AccountId, Account> =
            accounts.into_iter().map(|a| (a.id.clone(), a)).collect();

        let mut inventory = Self::default();
        for (id, account) in &accounts {
            inventory
                .names
                .entry(account.name.to_lowercase())
                .or_default()
                .insert(id.clone());

            // Units are matchable by id or by name.
            for unit in &account.org_units {
                for key in [unit.id.to_lowercase(), unit.name.to_lowercase()] {
                    inventory.org_units.entry(key).or_default().insert(id.clone());
                }
            }

            for tag in &account.tags {
                inventory.tags.entry(tag.folded()).or_default().insert(id.clone());
            }

            for region in &account.enabled_regions {
                inventory
                    .regions
                    .entry(region.clone())
                    .or_default()
                    .insert(id.clone());
            }

            if account.is_org_root {
                inventory.org_roots.insert(id.clone());
            }
        }
        inventory.accounts = accounts;
        inventory
    }

    /// Parse the inventory document produced by the external generator.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InventoryUnavailable`] if the document is not a valid
    /// inventory.
    pub fn from_json_str(input: &str) -> Result<Self, DispatchError> {
        let records: BTreeMap<String, InventoryRecord> = serde_json::from_str(input)
            .map_err(|e| DispatchError::InventoryUnavailable(format!("invalid inventory document: {e}")))?;

        Ok(Self::from_accounts(records.into_iter().map(|(id, record)| Account {
            id,
            name: record.name,
            tags: record
                .tags
                .into_iter()
                .map(|(name, value)| Tag { name, value })
                .collect(),
            org_units: record.parents.into_iter().collect(),
            enabled_regions: record.regions.into_iter().collect(),
            is_org_root: record.is_org_root,
        })))
    }

    /// Number of accounts in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the snapshot holds no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Look up a single account.
    #[must_use]
    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Iterate all accounts in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    /// All account ids.
    #[must_use]
    pub fn all_accounts(&self) -> BTreeSet<AccountId> {
        self.accounts.keys().cloned().collect()
    }

    /// The ids from `ids` that exist in the snapshot.
    #[must_use]
    pub fn accounts_by_ids<'a, I>(&self, ids: I) -> BTreeSet<AccountId>
    where
        I: IntoIterator<Item = &'a String>,
    {
        ids.into_iter()
            .filter(|id| self.accounts.contains_key(id.as_str()))
            .cloned()
            .collect()
    }

    /// Accounts whose name matches any of `names`, case-insensitively.
    #[must_use]
    pub fn accounts_by_names<'a, I>(&self, names: I) -> BTreeSet<AccountId>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter_map(|name| self.names.get(&name.to_lowercase()))
            .flatten()
            .cloned()
            .collect()
    }

    /// Accounts carrying the tag pair; name and value compare case-insensitively.
    #[must_use]
    pub fn accounts_by_tag(&self, tag: &Tag) -> BTreeSet<AccountId> {
        self.tags.get(&tag.folded()).cloned().unwrap_or_default()
    }

    /// Accounts under the org unit, given by id or by name.
    #[must_use]
    pub fn accounts_by_org_unit(&self, unit: &str) -> BTreeSet<AccountId> {
        self.org_units
            .get(&unit.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Region → accounts enabled there, for the requested regions.
    ///
    /// Regions nobody has enabled map to an empty set.
    #[must_use]
    pub fn accounts_by_regions<'a, I>(&self, regions: I) -> BTreeMap<Region, BTreeSet<AccountId>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        regions
            .into_iter()
            .map(|region| {
                (
                    region.clone(),
                    self.regions.get(region).cloned().unwrap_or_default(),
                )
            })
            .collect()
    }

    /// Region → accounts for every region any account has enabled.
    #[must_use]
    pub const fn accounts_for_all_regions(&self) -> &BTreeMap<Region, BTreeSet<AccountId>> {
        &self.regions
    }

    /// Ids of organization root accounts.
    #[must_use]
    pub const fn org_roots(&self) -> &BTreeSet<AccountId> {
        &self.org_roots
    }

    /// Id → name for the requested ids; unknown ids map to `None`.
    #[must_use]
    pub fn account_names<'a, I>(&self, ids: I) -> BTreeMap<AccountId, Option<String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        ids.into_iter()
            .map(|id| (id.clone(), self.accounts.get(id).map(|a| a.name.clone())))
            .collect()
    }

    /// Id → tags for the requested ids; unknown ids map to no tags.
    #[must_use]
    pub fn account_tags<'a, I>(&self, ids: I) -> BTreeMap<AccountId, BTreeMap<String, String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        ids.into_iter()
            .map(|id| {
                let tags = self
                    .accounts
                    .get(id)
                    .map(|a| {
                        a.tags
                            .iter()
                            .map(|t| (t.name.clone(), t.value.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                (id.clone(), tags)
            })
            .collect()
    }
}
