//! `sum(x)`: total of a numeric column, null when every value was null

use super::GroupByFunction;
use crate::aggregation::layout::{StateBlock, StateBlockMut, ValueType};
use crate::query::operators::RowRef;
use crate::types::{ColumnType, Value};

const SUM: usize = 0;

/// Sums a double or long column, skipping nulls
#[derive(Debug, Clone)]
pub struct Sum {
    name: String,
    column: usize,
}

impl Sum {
    /// Create the function over the column called `column_name` at `column`
    pub fn new(column_name: impl AsRef<str>, column: usize) -> Self {
        Self {
            name: format!("sum({})", column_name.as_ref()),
            column,
        }
    }
}

impl GroupByFunction for Sum {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_types(&self) -> &'static [ValueType] {
        &[ValueType::Double]
    }

    fn output_type(&self) -> ColumnType {
        ColumnType::Double
    }

    fn init(&self, state: &mut StateBlockMut<'_>, row: &RowRef<'_>) {
        state.set_double(SUM, row.get_double(self.column));
    }

    fn accumulate(&self, state: &mut StateBlockMut<'_>, row: &RowRef<'_>) {
        let value = row.get_double(self.column);
        if value.is_nan() {
            return;
        }
        let current = state.get_double(SUM);
        state.set_double(SUM, if current.is_nan() { value } else { current + value });
    }

    fn extract(&self, state: &StateBlock<'_>) -> Value {
        Value::Double(state.get_double(SUM))
    }

    fn reset(&self, state: &mut StateBlockMut<'_>) {
        state.set_double(SUM, f64::NAN);
    }
}
