//! Group keys
//!
//! A group is identified by the values of the non-timestamp grouping
//! columns. [`KeySink`] copies those values out of a row into an owned
//! [`GroupKey`] that the group table can hash and order.

use serde::Serialize;
use std::fmt;

use crate::query::operators::RowRef;
use crate::types::{ColumnType, Timestamp, Value};

/// One grouping column value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    /// Symbol value
    Symbol(Option<String>),
    /// Long value
    Long(i64),
    /// Timestamp value
    Timestamp(Timestamp),
}

impl From<KeyValue> for Value {
    fn from(value: KeyValue) -> Self {
        match value {
            KeyValue::Symbol(s) => Value::Symbol(s),
            KeyValue::Long(v) => Value::Long(v),
            KeyValue::Timestamp(v) => Value::Timestamp(v),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Symbol(Some(s)) => write!(f, "{}", s),
            KeyValue::Symbol(None) => write!(f, "null"),
            KeyValue::Long(v) | KeyValue::Timestamp(v) => write!(f, "{}", v),
        }
    }
}

/// Owned key of one group; empty for ungrouped queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey(pub Vec<KeyValue>);

impl GroupKey {
    /// Key values in grouping column order
    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }

    /// Estimated heap size in bytes
    pub fn memory_size(&self) -> usize {
        self.0
            .iter()
            .map(|v| match v {
                KeyValue::Symbol(Some(s)) => std::mem::size_of::<KeyValue>() + s.len(),
                _ => std::mem::size_of::<KeyValue>(),
            })
            .sum()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}

/// A grouping column resolved against the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    /// Column name, passed through to the output
    pub name: String,
    /// Column type
    pub column_type: ColumnType,
    /// Index in the input record
    pub input_index: usize,
}

/// Ordered grouping columns of a query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySchema {
    columns: Vec<KeyColumn>,
}

impl KeySchema {
    /// Create a schema from resolved columns
    pub fn new(columns: Vec<KeyColumn>) -> Self {
        Self { columns }
    }

    /// Grouping columns
    pub fn columns(&self) -> &[KeyColumn] {
        &self.columns
    }

    /// Number of grouping columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the query is ungrouped
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Copies grouping column values from rows into keys
#[derive(Debug, Clone)]
pub struct KeySink {
    schema: KeySchema,
}

impl KeySink {
    /// Create a sink for `schema`
    pub fn new(schema: KeySchema) -> Self {
        Self { schema }
    }

    /// Key of the group `row` belongs to
    pub fn key(&self, row: &RowRef<'_>) -> GroupKey {
        GroupKey(
            self.schema
                .columns
                .iter()
                .map(|c| match c.column_type {
                    ColumnType::Symbol => {
                        KeyValue::Symbol(row.get_symbol(c.input_index).map(str::to_owned))
                    }
                    ColumnType::Timestamp => KeyValue::Timestamp(row.get_timestamp(c.input_index)),
                    ColumnType::Long | ColumnType::Double => {
                        KeyValue::Long(row.get_long(c.input_index))
                    }
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::operators::RecordBatch;
    use crate::types::RecordMetadata;
    use std::sync::Arc;

    #[test]
    fn test_key_sink() {
        let metadata = Arc::new(
            RecordMetadata::builder()
                .column("s", ColumnType::Symbol)
                .column("n", ColumnType::Long)
                .timestamp("k")
                .build(),
        );
        let batch = RecordBatch::from_rows(
            metadata,
            vec![
                vec![Value::Symbol(Some("AAA".into())), Value::Long(1), Value::Timestamp(0)],
                vec![Value::Symbol(None), Value::Long(2), Value::Timestamp(1)],
            ],
        )
        .unwrap();

        let sink = KeySink::new(KeySchema::new(vec![
            KeyColumn {
                name: "s".into(),
                column_type: ColumnType::Symbol,
                input_index: 0,
            },
            KeyColumn {
                name: "n".into(),
                column_type: ColumnType::Long,
                input_index: 1,
            },
        ]));

        let first = sink.key(&batch.row(0));
        assert_eq!(
            first,
            GroupKey(vec![KeyValue::Symbol(Some("AAA".into())), KeyValue::Long(1)])
        );
        assert_eq!(first.to_string(), "[AAA, 1]");

        let second = sink.key(&batch.row(1));
        assert_eq!(second.values()[0], KeyValue::Symbol(None));
        assert!(second < first);
    }

    #[test]
    fn test_empty_key() {
        let sink = KeySink::new(KeySchema::default());
        let metadata = Arc::new(RecordMetadata::builder().timestamp("k").build());
        let batch = RecordBatch::from_rows(metadata, vec![vec![Value::Timestamp(0)]]).unwrap();
        assert_eq!(sink.key(&batch.row(0)), GroupKey::default());
    }
}
