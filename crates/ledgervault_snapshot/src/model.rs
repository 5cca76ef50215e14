//! Core data model: collections, records and snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Shard name used for collections that are not split by owner.
pub const DEFAULT_SHARD: &str = "records";
/// Shard name for transactions that carry no owning ledger.
const UNASSIGNED_SHARD: &str = "unassigned";

/// The fixed set of logical data categories.
///
/// The order of [`Collection::ALL`] is the order used everywhere a snapshot
/// is laid out: archive entries, extraction and the swap step of an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Ledgers (books of account).
    Ledgers,
    /// Transactions, sharded by owning ledger.
    Transactions,
    /// Income/expense categories.
    Categories,
    /// Budgets.
    Budgets,
    /// Savings plans.
    SavingsPlans,
    /// Accounts.
    Accounts,
    /// Currencies and exchange rates.
    Currencies,
    /// Application settings.
    Settings,
}

impl Collection {
    /// Every collection, in canonical order.
    pub const ALL: [Collection; 8] = [
        Collection::Ledgers,
        Collection::Transactions,
        Collection::Categories,
        Collection::Budgets,
        Collection::SavingsPlans,
        Collection::Accounts,
        Collection::Currencies,
        Collection::Settings,
    ];

    /// Returns the directory / archive entry name of this collection.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::Ledgers => "ledgers",
            Collection::Transactions => "transactions",
            Collection::Categories => "categories",
            Collection::Budgets => "budgets",
            Collection::SavingsPlans => "savings_plans",
            Collection::Accounts => "accounts",
            Collection::Currencies => "currencies",
            Collection::Settings => "settings",
        }
    }

    /// Parses a directory / archive entry name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Returns true if records of this collection are split into one shard per owner.
    #[must_use]
    pub const fn is_sharded(&self) -> bool {
        matches!(self, Collection::Transactions)
    }

    /// Returns the shard a record belongs to.
    #[must_use]
    pub fn shard_of(&self, record: &Record) -> String {
        if !self.is_sharded() {
            return DEFAULT_SHARD.to_string();
        }
        match record.owner.as_deref() {
            Some(owner) if !owner.is_empty() => sanitize_shard(owner),
            _ => UNASSIGNED_SHARD.to_string(),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an owner id onto a file-name-safe shard name.
///
/// Distinct owners may share a shard after sanitizing; records keep their
/// `owner` field so nothing is lost when shards are merged on read.
fn sanitize_shard(owner: &str) -> String {
    owner
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(96)
        .collect()
}

/// Returns true if `name` could have been produced as a shard name.
#[must_use]
pub fn is_valid_shard_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 96
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A single persisted record.
///
/// The engine does not interpret `data`; only `owner` matters, and only for
/// collections that are sharded by owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable record identifier.
    pub id: String,
    /// Owning entity (the ledger id for transactions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Record body.
    pub data: serde_json::Value,
}

impl Record {
    /// Creates a record without an owner.
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            owner: None,
            data,
        }
    }

    /// Creates a record owned by another entity.
    pub fn owned(id: impl Into<String>, owner: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            owner: Some(owner.into()),
            data,
        }
    }
}

/// All records of every collection.
///
/// Every collection is always present, possibly with no records, so an
/// empty collection is encoded as empty rather than absent.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySet {
    collections: BTreeMap<Collection, Vec<Record>>,
}

impl EntitySet {
    /// Creates a set where every collection is empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: Collection::ALL.into_iter().map(|c| (c, Vec::new())).collect(),
        }
    }

    /// Returns the records of a collection.
    #[must_use]
    pub fn get(&self, collection: Collection) -> &[Record] {
        self.collections
            .get(&collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replaces the records of a collection.
    pub fn set(&mut self, collection: Collection, records: Vec<Record>) {
        self.collections.insert(collection, records);
    }

    /// Appends a record to a collection.
    pub fn push(&mut self, collection: Collection, record: Record) {
        self.collections.entry(collection).or_default().push(record);
    }

    /// Builder-style variant of [`EntitySet::push`].
    #[must_use]
    pub fn with(mut self, collection: Collection, record: Record) -> Self {
        self.push(collection, record);
        self
    }

    /// Returns the number of records in a collection.
    #[must_use]
    pub fn count(&self, collection: Collection) -> usize {
        self.get(collection).len()
    }

    /// Returns the record count of every collection.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<Collection, u64> {
        Collection::ALL
            .into_iter()
            .map(|c| (c, self.count(c) as u64))
            .collect()
    }

    /// Returns the total number of records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// Groups the records of a collection by shard, in shard-name order.
    #[must_use]
    pub fn shards(&self, collection: Collection) -> BTreeMap<String, Vec<&Record>> {
        let mut shards: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
        for record in self.get(collection) {
            shards
                .entry(collection.shard_of(record))
                .or_default()
                .push(record);
        }
        shards
    }
}

impl Default for EntitySet {
    fn default() -> Self {
        Self::new()
    }
}

/// All application data at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Schema version of the entity data, passed through to the data store.
    pub format_version: u32,
    /// Creation time (Unix milliseconds).
    pub created_at: u64,
    /// Identifier of the install that produced the snapshot.
    pub origin_device_id: String,
    /// The captured records.
    pub entities: EntitySet,
}

impl Snapshot {
    /// Creates a snapshot.
    pub fn new(
        format_version: u32,
        created_at: u64,
        origin_device_id: impl Into<String>,
        entities: EntitySet,
    ) -> Self {
        Self {
            format_version,
            created_at,
            origin_device_id: origin_device_id.into(),
            entities,
        }
    }

    /// Number of ledgers in the snapshot.
    #[must_use]
    pub fn ledger_count(&self) -> u64 {
        self.entities.count(Collection::Ledgers) as u64
    }

    /// Number of transactions in the snapshot.
    #[must_use]
    pub fn transaction_count(&self) -> u64 {
        self.entities.count(Collection::Transactions) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_names_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(Collection::from_name(collection.as_str()), Some(collection));
        }
        assert_eq!(Collection::from_name("unknown"), None);
    }

    #[test]
    fn new_set_has_every_collection() {
        let set = EntitySet::new();
        assert_eq!(set.total(), 0);
        assert_eq!(set.counts().len(), Collection::ALL.len());
    }

    #[test]
    fn transactions_shard_by_ledger() {
        let set = EntitySet::new()
            .with(Collection::Transactions, Record::owned("t1", "L1", json!({})))
            .with(Collection::Transactions, Record::owned("t2", "L2", json!({})))
            .with(Collection::Transactions, Record::owned("t3", "L1", json!({})))
            .with(Collection::Transactions, Record::new("t4", json!({})));

        let shards = set.shards(Collection::Transactions);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards["L1"].len(), 2);
        assert_eq!(shards["L2"].len(), 1);
        assert_eq!(shards["unassigned"].len(), 1);
    }

    #[test]
    fn unsharded_collections_use_single_shard() {
        let set = EntitySet::new()
            .with(Collection::Budgets, Record::owned("b1", "L1", json!({})))
            .with(Collection::Budgets, Record::owned("b2", "L2", json!({})));

        let shards = set.shards(Collection::Budgets);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[DEFAULT_SHARD].len(), 2);
    }

    #[test]
    fn shard_names_are_sanitized() {
        let record = Record::owned("t", "../etc/passwd", json!(null));
        let shard = Collection::Transactions.shard_of(&record);
        assert_eq!(shard, "___etc_passwd");
        assert!(is_valid_shard_name(&shard));
        assert!(!is_valid_shard_name("../x"));
        assert!(!is_valid_shard_name(""));
    }
}
