//! `count()`: rows per group and bucket

use super::GroupByFunction;
use crate::aggregation::layout::{StateBlock, StateBlockMut, ValueType};
use crate::query::operators::RowRef;
use crate::types::{ColumnType, Value, LONG_NULL};

const COUNT: usize = 0;

/// Counts every row, nulls included
#[derive(Debug, Clone, Default)]
pub struct Count;

impl Count {
    /// Create the function
    pub fn new() -> Self {
        Self
    }
}

impl GroupByFunction for Count {
    fn name(&self) -> &str {
        "count()"
    }

    fn value_types(&self) -> &'static [ValueType] {
        &[ValueType::Long]
    }

    fn output_type(&self) -> ColumnType {
        ColumnType::Long
    }

    fn init(&self, state: &mut StateBlockMut<'_>, _row: &RowRef<'_>) {
        state.set_long(COUNT, 1);
    }

    fn accumulate(&self, state: &mut StateBlockMut<'_>, _row: &RowRef<'_>) {
        let current = state.get_long(COUNT);
        state.set_long(COUNT, current.saturating_add(1));
    }

    fn extract(&self, state: &StateBlock<'_>) -> Value {
        let count = state.get_long(COUNT);
        Value::Long(if count == LONG_NULL { 0 } else { count })
    }

    fn reset(&self, state: &mut StateBlockMut<'_>) {
        state.set_long(COUNT, 0);
    }
}
