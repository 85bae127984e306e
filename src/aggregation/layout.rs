//! Per-group value layout
//!
//! Every group owns one fixed-size byte record. Each aggregate function owns
//! a contiguous block of typed fields inside that record. Layout is decided
//! in two phases so no offset is ever mutated after the engine starts:
//!
//! 1. **Registration**: each function hands its field manifest to a
//!    [`ValueSchemaBuilder`] and gets back the index of its first field.
//! 2. **Binding**: the frozen [`ValueSchema`] resolves each base index into a
//!    [`ValueSlot`], a byte range plus block-relative field layouts.
//!
//! Functions never see the record, only the [`StateBlock`] / [`StateBlockMut`]
//! view of their own slot, so an aggregate cannot write outside its block.
//!
//! Fields are little-endian 8-byte values read and written through the
//! `bytes` crate's `Buf` / `BufMut` cursors.

use bytes::{Buf, BufMut};
use std::fmt;

use crate::types::{Timestamp, LONG_NULL, TIMESTAMP_NULL};

/// Width of every field in bytes
pub const FIELD_SIZE: usize = 8;

/// Type of a single state field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// f64, empty value NaN
    Double,
    /// i64, empty value `LONG_NULL`
    Long,
    /// i64 microseconds, empty value `TIMESTAMP_NULL`
    Timestamp,
}

impl ValueType {
    /// Width of the field in bytes
    pub const fn size(self) -> usize {
        FIELD_SIZE
    }
}

/// Location of one field, relative to the start of whatever it is laid out in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    /// Byte offset
    pub offset: usize,
    /// Field type
    pub value_type: ValueType,
}

/// Phase 1: collects the field manifests of every aggregate in order
#[derive(Debug, Default)]
pub struct ValueSchemaBuilder {
    fields: Vec<ValueType>,
}

impl ValueSchemaBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a manifest and return the index of its first field
    pub fn register(&mut self, types: &[ValueType]) -> usize {
        let base = self.fields.len();
        self.fields.extend_from_slice(types);
        base
    }

    /// Number of fields registered so far
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Freeze the layout
    pub fn build(self) -> ValueSchema {
        let mut offset = 0;
        let fields = self
            .fields
            .into_iter()
            .map(|value_type| {
                let layout = FieldLayout { offset, value_type };
                offset += value_type.size();
                layout
            })
            .collect();

        ValueSchema {
            fields,
            record_size: offset,
        }
    }
}

/// Phase 2: immutable record layout shared by every group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSchema {
    fields: Vec<FieldLayout>,
    record_size: usize,
}

impl ValueSchema {
    /// Size of one group record in bytes
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Number of fields in the record
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Absolute layout of every field
    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    /// Resolve a registered base index into a slot of `count` fields
    ///
    /// Returns `None` when the range does not lie inside the schema.
    pub fn slot(&self, base: usize, count: usize) -> Option<ValueSlot> {
        let end = base.checked_add(count)?;
        let fields = self.fields.get(base..end)?;
        let start = fields.first().map(|f| f.offset).unwrap_or(0);
        let len = count * FIELD_SIZE;

        Some(ValueSlot {
            base_field: base,
            offset: start,
            len,
            fields: fields
                .iter()
                .map(|f| FieldLayout {
                    offset: f.offset - start,
                    value_type: f.value_type,
                })
                .collect(),
        })
    }

    /// Allocate a record with every field set to its empty value
    pub fn new_record(&self) -> RecordValue {
        let mut data = vec![0u8; self.record_size].into_boxed_slice();
        for field in &self.fields {
            let mut cursor = &mut data[field.offset..field.offset + FIELD_SIZE];
            match field.value_type {
                ValueType::Double => cursor.put_f64_le(f64::NAN),
                ValueType::Long => cursor.put_i64_le(LONG_NULL),
                ValueType::Timestamp => cursor.put_i64_le(TIMESTAMP_NULL),
            }
        }
        RecordValue { data }
    }
}

/// A function's resolved block inside the record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSlot {
    base_field: usize,
    offset: usize,
    len: usize,
    fields: Vec<FieldLayout>,
}

impl ValueSlot {
    /// Index of the first field in the schema
    pub fn base_field(&self) -> usize {
        self.base_field
    }

    /// Byte offset of the block in the record
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the block in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block has no fields
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Block-relative layout of the fields
    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }
}

/// Byte record holding the state of every aggregate for one group
#[derive(Clone, PartialEq)]
pub struct RecordValue {
    data: Box<[u8]>,
}

impl RecordValue {
    /// Record size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the record holds no fields
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only view of one slot
    pub fn block<'a>(&'a self, slot: &'a ValueSlot) -> StateBlock<'a> {
        StateBlock {
            data: &self.data[slot.offset..slot.offset + slot.len],
            fields: &slot.fields,
        }
    }

    /// Mutable view of one slot
    pub fn block_mut<'a>(&'a mut self, slot: &'a ValueSlot) -> StateBlockMut<'a> {
        StateBlockMut {
            data: &mut self.data[slot.offset..slot.offset + slot.len],
            fields: &slot.fields,
        }
    }
}

impl fmt::Debug for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordValue")
            .field("len", &self.data.len())
            .finish()
    }
}

fn read_f64(data: &[u8], field: FieldLayout) -> f64 {
    debug_assert_eq!(field.value_type, ValueType::Double);
    let mut cursor = &data[field.offset..field.offset + FIELD_SIZE];
    cursor.get_f64_le()
}

fn read_i64(data: &[u8], field: FieldLayout) -> i64 {
    debug_assert_ne!(field.value_type, ValueType::Double);
    let mut cursor = &data[field.offset..field.offset + FIELD_SIZE];
    cursor.get_i64_le()
}

/// Read-only view of one aggregate's block
#[derive(Debug, Clone, Copy)]
pub struct StateBlock<'a> {
    data: &'a [u8],
    fields: &'a [FieldLayout],
}

impl<'a> StateBlock<'a> {
    /// Read a double field
    pub fn get_double(&self, field: usize) -> f64 {
        read_f64(self.data, self.fields[field])
    }

    /// Read a long field
    pub fn get_long(&self, field: usize) -> i64 {
        read_i64(self.data, self.fields[field])
    }

    /// Read a timestamp field
    pub fn get_timestamp(&self, field: usize) -> Timestamp {
        read_i64(self.data, self.fields[field])
    }
}

/// Mutable view of one aggregate's block
#[derive(Debug)]
pub struct StateBlockMut<'a> {
    data: &'a mut [u8],
    fields: &'a [FieldLayout],
}

impl<'a> StateBlockMut<'a> {
    /// Reborrow as a read-only view
    pub fn as_block(&self) -> StateBlock<'_> {
        StateBlock {
            data: &*self.data,
            fields: self.fields,
        }
    }

    /// Read a double field
    pub fn get_double(&self, field: usize) -> f64 {
        read_f64(&*self.data, self.fields[field])
    }

    /// Read a long field
    pub fn get_long(&self, field: usize) -> i64 {
        read_i64(&*self.data, self.fields[field])
    }

    /// Read a timestamp field
    pub fn get_timestamp(&self, field: usize) -> Timestamp {
        read_i64(&*self.data, self.fields[field])
    }

    /// Write a double field
    pub fn set_double(&mut self, field: usize, value: f64) {
        let layout = self.fields[field];
        debug_assert_eq!(layout.value_type, ValueType::Double);
        let mut cursor = &mut self.data[layout.offset..layout.offset + FIELD_SIZE];
        cursor.put_f64_le(value);
    }

    /// Write a long field
    pub fn set_long(&mut self, field: usize, value: i64) {
        let layout = self.fields[field];
        debug_assert_ne!(layout.value_type, ValueType::Double);
        let mut cursor = &mut self.data[layout.offset..layout.offset + FIELD_SIZE];
        cursor.put_i64_le(value);
    }

    /// Write a timestamp field
    pub fn set_timestamp(&mut self, field: usize, value: Timestamp) {
        self.set_long(field, value);
    }

    /// Add to a double field
    pub fn add_double(&mut self, field: usize, delta: f64) {
        let current = self.get_double(field);
        self.set_double(field, current + delta);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn two_function_schema() -> (ValueSchema, ValueSlot, ValueSlot) {
        let mut builder = ValueSchemaBuilder::new();
        let first = builder.register(&[ValueType::Long]);
        let second = builder.register(&[
            ValueType::Double,
            ValueType::Timestamp,
            ValueType::Double,
        ]);
        assert_eq!(first, 0);
        assert_eq!(second, 1);

        let schema = builder.build();
        let a = schema.slot(first, 1).unwrap();
        let b = schema.slot(second, 3).unwrap();
        (schema, a, b)
    }

    #[test]
    fn test_offsets_are_concatenated() {
        let (schema, a, b) = two_function_schema();
        assert_eq!(schema.record_size(), 32);
        assert_eq!(schema.field_count(), 4);
        assert_eq!(a.offset(), 0);
        assert_eq!(a.len(), 8);
        assert_eq!(b.offset(), 8);
        assert_eq!(b.len(), 24);
        assert_eq!(b.fields()[0].offset, 0);
        assert_eq!(b.fields()[2].offset, 16);
        assert_eq!(b.base_field(), 1);
    }

    #[test]
    fn test_slot_out_of_range() {
        let (schema, _, _) = two_function_schema();
        assert!(schema.slot(2, 3).is_none());
        assert!(schema.slot(usize::MAX, 2).is_none());
    }

    #[test]
    fn test_new_record_is_empty() {
        let (schema, a, b) = two_function_schema();
        let record = schema.new_record();
        assert_eq!(record.block(&a).get_long(0), LONG_NULL);
        assert!(record.block(&b).get_double(0).is_nan());
        assert_eq!(record.block(&b).get_timestamp(1), TIMESTAMP_NULL);
    }

    #[test]
    fn test_blocks_do_not_overlap() {
        let (schema, a, b) = two_function_schema();
        let mut record = schema.new_record();

        {
            let mut block = record.block_mut(&b);
            block.set_double(0, 1.5);
            block.set_timestamp(1, 42);
            block.set_double(2, 0.0);
            block.add_double(2, 2.25);
        }
        record.block_mut(&a).set_long(0, 7);

        assert_eq!(record.block(&a).get_long(0), 7);
        let view = record.block(&b);
        assert_eq!(view.get_double(0), 1.5);
        assert_eq!(view.get_timestamp(1), 42);
        assert_eq!(view.get_double(2), 2.25);
    }

    #[test]
    fn test_empty_schema() {
        let schema = ValueSchemaBuilder::new().build();
        assert_eq!(schema.record_size(), 0);
        assert!(schema.new_record().is_empty());
    }
}
