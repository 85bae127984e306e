//! Group tables
//!
//! Maps each [`GroupKey`] to its per-group record. Two implementations are
//! provided:
//!
//! - [`HashGroupTable`]: hash map, iteration in hash order. Output order of a
//!   grouped query is therefore not stable across runs.
//! - [`OrderedGroupTable`]: B-tree map, iteration in key order. Grouped output
//!   within a bucket is sorted by key.
//!
//! Both enforce a maximum number of groups so a runaway key cardinality
//! fails the query instead of exhausting memory.

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::hash_map;
use std::collections::{BTreeMap, HashMap, TryReserveError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::aggregation::key::GroupKey;
use crate::aggregation::layout::{RecordValue, ValueSchema};

/// Group table failures
#[derive(Error, Debug)]
pub enum GroupTableError {
    /// The table already holds the maximum number of groups
    #[error("group limit of {max} exceeded")]
    CapacityExceeded {
        /// Configured maximum
        max: usize,
    },

    /// The table could not reserve room for its initial capacity
    #[error("failed to reserve {requested} groups")]
    ReservationFailed {
        /// Requested number of groups
        requested: usize,
        /// Allocator error
        #[source]
        source: TryReserveError,
    },
}

/// Which table implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupTableKind {
    /// Hash order
    #[default]
    Hash,
    /// Key order
    Ordered,
}

impl FromStr for GroupTableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "ordered" | "btree" => Ok(Self::Ordered),
            other => Err(format!("unknown group table kind '{}'", other)),
        }
    }
}

impl fmt::Display for GroupTableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupTableKind::Hash => write!(f, "hash"),
            GroupTableKind::Ordered => write!(f, "ordered"),
        }
    }
}

/// Per-group state
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    /// Aggregate state of every function
    pub value: RecordValue,
}

impl GroupRecord {
    /// Wrap a freshly allocated record
    pub fn new(value: RecordValue) -> Self {
        Self { value }
    }
}

/// Key to record map used by the engine
pub trait GroupTable: fmt::Debug + Send {
    /// Look up `key`, creating an empty record when absent
    ///
    /// The flag is `true` when the record was just created.
    fn find_or_create(&mut self, key: GroupKey)
        -> Result<(&mut GroupRecord, bool), GroupTableError>;

    /// Iterate every group
    fn iter(&self) -> Box<dyn Iterator<Item = (&GroupKey, &GroupRecord)> + '_>;

    /// Remove and return every group in iteration order
    fn drain(&mut self) -> Vec<(GroupKey, GroupRecord)>;

    /// Remove every group
    fn clear(&mut self);

    /// Number of groups
    fn len(&self) -> usize;

    /// Whether the table holds no groups
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether iteration is in key order
    fn is_ordered(&self) -> bool;

    /// Schema every record follows
    fn schema(&self) -> &Arc<ValueSchema>;
}

/// Create the table selected by `kind`
pub fn create_group_table(
    kind: GroupTableKind,
    schema: Arc<ValueSchema>,
    initial_capacity: usize,
    max_groups: usize,
) -> Result<Box<dyn GroupTable>, GroupTableError> {
    Ok(match kind {
        GroupTableKind::Hash => Box::new(HashGroupTable::try_with_capacity(
            schema,
            initial_capacity,
            max_groups,
        )?),
        GroupTableKind::Ordered => Box::new(OrderedGroupTable::try_with_capacity(
            schema,
            initial_capacity,
            max_groups,
        )?),
    })
}

fn check_capacity(initial_capacity: usize, max_groups: usize) -> Result<(), GroupTableError> {
    if initial_capacity > max_groups {
        return Err(GroupTableError::CapacityExceeded { max: max_groups });
    }
    Ok(())
}

// ============================================================================
// Hash Table
// ============================================================================

/// Hash-ordered group table
#[derive(Debug)]
pub struct HashGroupTable {
    schema: Arc<ValueSchema>,
    groups: HashMap<GroupKey, GroupRecord>,
    max_groups: usize,
}

impl HashGroupTable {
    /// Create a table with room for `initial_capacity` groups
    pub fn try_with_capacity(
        schema: Arc<ValueSchema>,
        initial_capacity: usize,
        max_groups: usize,
    ) -> Result<Self, GroupTableError> {
        check_capacity(initial_capacity, max_groups)?;

        let mut groups = HashMap::new();
        groups
            .try_reserve(initial_capacity)
            .map_err(|source| GroupTableError::ReservationFailed {
                requested: initial_capacity,
                source,
            })?;

        Ok(Self {
            schema,
            groups,
            max_groups,
        })
    }
}

impl GroupTable for HashGroupTable {
    fn find_or_create(
        &mut self,
        key: GroupKey,
    ) -> Result<(&mut GroupRecord, bool), GroupTableError> {
        let len = self.groups.len();
        match self.groups.entry(key) {
            hash_map::Entry::Occupied(entry) => Ok((entry.into_mut(), false)),
            hash_map::Entry::Vacant(entry) => {
                if len >= self.max_groups {
                    return Err(GroupTableError::CapacityExceeded {
                        max: self.max_groups,
                    });
                }
                let record = GroupRecord::new(self.schema.new_record());
                Ok((entry.insert(record), true))
            }
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&GroupKey, &GroupRecord)> + '_> {
        Box::new(self.groups.iter())
    }

    fn drain(&mut self) -> Vec<(GroupKey, GroupRecord)> {
        self.groups.drain().collect()
    }

    fn clear(&mut self) {
        self.groups.clear();
    }

    fn len(&self) -> usize {
        self.groups.len()
    }

    fn is_ordered(&self) -> bool {
        false
    }

    fn schema(&self) -> &Arc<ValueSchema> {
        &self.schema
    }
}

// ============================================================================
// Ordered Table
// ============================================================================

/// Key-ordered group table
#[derive(Debug)]
pub struct OrderedGroupTable {
    schema: Arc<ValueSchema>,
    groups: BTreeMap<GroupKey, GroupRecord>,
    max_groups: usize,
}

impl OrderedGroupTable {
    /// Create a table; B-trees grow by node so only the limit is checked
    pub fn try_with_capacity(
        schema: Arc<ValueSchema>,
        initial_capacity: usize,
        max_groups: usize,
    ) -> Result<Self, GroupTableError> {
        check_capacity(initial_capacity, max_groups)?;
        Ok(Self {
            schema,
            groups: BTreeMap::new(),
            max_groups,
        })
    }
}

impl GroupTable for OrderedGroupTable {
    fn find_or_create(
        &mut self,
        key: GroupKey,
    ) -> Result<(&mut GroupRecord, bool), GroupTableError> {
        let len = self.groups.len();
        match self.groups.entry(key) {
            btree_map::Entry::Occupied(entry) => Ok((entry.into_mut(), false)),
            btree_map::Entry::Vacant(entry) => {
                if len >= self.max_groups {
                    return Err(GroupTableError::CapacityExceeded {
                        max: self.max_groups,
                    });
                }
                let record = GroupRecord::new(self.schema.new_record());
                Ok((entry.insert(record), true))
            }
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&GroupKey, &GroupRecord)> + '_> {
        Box::new(self.groups.iter())
    }

    fn drain(&mut self) -> Vec<(GroupKey, GroupRecord)> {
        std::mem::take(&mut self.groups).into_iter().collect()
    }

    fn clear(&mut self) {
        self.groups.clear();
    }

    fn len(&self) -> usize {
        self.groups.len()
    }

    fn is_ordered(&self) -> bool {
        true
    }

    fn schema(&self) -> &Arc<ValueSchema> {
        &self.schema
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::key::KeyValue;
    use crate::aggregation::layout::{ValueSchemaBuilder, ValueType};

    fn schema() -> Arc<ValueSchema> {
        let mut builder = ValueSchemaBuilder::new();
        builder.register(&[ValueType::Long, ValueType::Double]);
        Arc::new(builder.build())
    }

    fn key(s: &str) -> GroupKey {
        GroupKey(vec![KeyValue::Symbol(Some(s.to_string()))])
    }

    fn exercise(table: &mut dyn GroupTable) {
        let slot = table.schema().slot(0, 2).unwrap();
        let (record, created) = table.find_or_create(key("b")).unwrap();
        assert!(created);
        record.value.block_mut(&slot).set_long(0, 10);

        let (record, created) = table.find_or_create(key("b")).unwrap();
        assert!(!created);
        assert_eq!(record.value.block(&slot).get_long(0), 10);

        table.find_or_create(key("a")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.iter().count(), 2);
    }

    #[test]
    fn test_hash_table() {
        let mut table = HashGroupTable::try_with_capacity(schema(), 4, 16).unwrap();
        exercise(&mut table);
        assert!(!table.is_ordered());
        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_ordered_table_iterates_in_key_order() {
        let mut table = OrderedGroupTable::try_with_capacity(schema(), 0, 16).unwrap();
        exercise(&mut table);
        assert!(table.is_ordered());
        let keys: Vec<_> = table.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![key("a"), key("b")]);

        let drained = table.drain();
        assert_eq!(drained[0].0, key("a"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_max_groups() {
        let mut table = create_group_table(GroupTableKind::Hash, schema(), 0, 1).unwrap();
        table.find_or_create(key("a")).unwrap();
        // existing keys still resolve at the limit
        table.find_or_create(key("a")).unwrap();
        let err = table.find_or_create(key("b")).unwrap_err();
        assert!(matches!(err, GroupTableError::CapacityExceeded { max: 1 }));
    }

    #[test]
    fn test_initial_capacity_above_limit() {
        let err = create_group_table(GroupTableKind::Ordered, schema(), 10, 5).unwrap_err();
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn test_clear() {
        let mut table = create_group_table(GroupTableKind::Ordered, schema(), 0, 8).unwrap();
        table.find_or_create(key("x")).unwrap();
        table.clear();
        assert!(table.is_empty());
        assert!(Arc::ptr_eq(table.schema(), table.schema()));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("hash".parse::<GroupTableKind>().unwrap(), GroupTableKind::Hash);
        assert_eq!("Ordered".parse::<GroupTableKind>().unwrap(), GroupTableKind::Ordered);
        assert!("tree".parse::<GroupTableKind>().is_err());
    }
}
