//! Row filter expressions.
//!
//! A [`Filter`] is a boolean predicate over named columns. It is evaluated
//! with Arrow compute kernels using Kleene logic; rows for which it is null
//! are dropped. Literals are cast to the column type before comparing.
//!
//! ```
//! use lakestore_core::col;
//!
//! let filter = col("Pregnancies").eq(0).and(col("Outcome").is_not_null());
//! assert_eq!(filter.columns(), vec!["Outcome", "Pregnancies"]);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, Float64Array, Int64Array, Scalar, StringArray,
};
use arrow::compute::kernels::cmp;
use arrow::compute::{and_kleene, cast, filter_record_batch, is_not_null, is_null, not, or_kleene};
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::{Result, StorageError};

/// Literal value of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl ScalarValue {
    fn to_array(&self) -> ArrayRef {
        match self {
            ScalarValue::Null => new_null_array(&DataType::Null, 1),
            ScalarValue::Boolean(v) => Arc::new(BooleanArray::from(vec![*v])),
            ScalarValue::Int64(v) => Arc::new(Int64Array::from(vec![*v])),
            ScalarValue::Float64(v) => Arc::new(Float64Array::from(vec![*v])),
            ScalarValue::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str()])),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Utf8(v) => write!(f, "'{}'", v),
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ScalarValue {
            fn from(value: $ty) -> Self {
                ScalarValue::$variant(value.into())
            }
        })*
    };
}

scalar_from!(
    bool => Boolean,
    i8 => Int64,
    i16 => Int64,
    i32 => Int64,
    i64 => Int64,
    u8 => Int64,
    u16 => Int64,
    u32 => Int64,
    f32 => Float64,
    f64 => Float64,
    String => Utf8,
    &str => Utf8,
);

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ScalarValue::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        f.write_str(symbol)
    }
}

/// Boolean predicate over the columns of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        column: String,
        op: CompareOp,
        value: ScalarValue,
    },
    IsNull(String),
    IsNotNull(String),
    In {
        column: String,
        values: Vec<ScalarValue>,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

/// Column reference used to build filters.
#[derive(Debug, Clone)]
pub struct Column(String);

pub fn col(name: impl Into<String>) -> Column {
    Column(name.into())
}

impl Column {
    fn compare(self, op: CompareOp, value: impl Into<ScalarValue>) -> Filter {
        Filter::Compare {
            column: self.0,
            op,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<ScalarValue>) -> Filter {
        self.compare(CompareOp::Eq, value)
    }

    pub fn not_eq(self, value: impl Into<ScalarValue>) -> Filter {
        self.compare(CompareOp::NotEq, value)
    }

    pub fn lt(self, value: impl Into<ScalarValue>) -> Filter {
        self.compare(CompareOp::Lt, value)
    }

    pub fn lt_eq(self, value: impl Into<ScalarValue>) -> Filter {
        self.compare(CompareOp::LtEq, value)
    }

    pub fn gt(self, value: impl Into<ScalarValue>) -> Filter {
        self.compare(CompareOp::Gt, value)
    }

    pub fn gt_eq(self, value: impl Into<ScalarValue>) -> Filter {
        self.compare(CompareOp::GtEq, value)
    }

    pub fn is_null(self) -> Filter {
        Filter::IsNull(self.0)
    }

    pub fn is_not_null(self) -> Filter {
        Filter::IsNotNull(self.0)
    }

    pub fn is_in<I, V>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        Filter::In {
            column: self.0,
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }
}

impl Filter {
    pub fn and(self, other: Filter) -> Filter {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Filter {
        Filter::Or(Box::new(self), Box::new(other))
    }

    /// Conjunction of all filters, `None` when there are none.
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Option<Filter> {
        filters.into_iter().reduce(Filter::and)
    }

    /// Distinct column names referenced, sorted.
    pub fn columns(&self) -> Vec<&str> {
        let mut names = BTreeSet::new();
        self.collect_columns(&mut names);
        names.into_iter().collect()
    }

    fn collect_columns<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Filter::Compare { column, .. }
            | Filter::In { column, .. }
            | Filter::IsNull(column)
            | Filter::IsNotNull(column) => {
                names.insert(column.as_str());
            }
            Filter::And(l, r) | Filter::Or(l, r) => {
                l.collect_columns(names);
                r.collect_columns(names);
            }
            Filter::Not(inner) => inner.collect_columns(names),
        }
    }

    /// Check every referenced column exists in `schema`.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for name in self.columns() {
            if schema.field_with_name(name).is_err() {
                return Err(StorageError::schema(format!(
                    "filter references unknown column '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Evaluate to a mask with one entry per row of `batch`.
    pub fn evaluate(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        match self {
            Filter::Compare { column, op, value } => {
                compare(column_of(batch, column)?, *op, value)
            }
            Filter::IsNull(column) => is_null(column_of(batch, column)?.as_ref())
                .map_err(|e| StorageError::arrow("Failed to evaluate IS NULL", e)),
            Filter::IsNotNull(column) => is_not_null(column_of(batch, column)?.as_ref())
                .map_err(|e| StorageError::arrow("Failed to evaluate IS NOT NULL", e)),
            Filter::In { column, values } => {
                let array = column_of(batch, column)?;
                let mut mask = BooleanArray::from(vec![false; batch.num_rows()]);
                for value in values {
                    let hit = compare(array, CompareOp::Eq, value)?;
                    mask = or_kleene(&mask, &hit)
                        .map_err(|e| StorageError::arrow("Failed to evaluate IN", e))?;
                }
                Ok(mask)
            }
            Filter::And(l, r) => and_kleene(&l.evaluate(batch)?, &r.evaluate(batch)?)
                .map_err(|e| StorageError::arrow("Failed to evaluate AND", e)),
            Filter::Or(l, r) => or_kleene(&l.evaluate(batch)?, &r.evaluate(batch)?)
                .map_err(|e| StorageError::arrow("Failed to evaluate OR", e)),
            Filter::Not(inner) => not(&inner.evaluate(batch)?)
                .map_err(|e| StorageError::arrow("Failed to evaluate NOT", e)),
        }
    }

    /// Keep the rows of `batch` for which the filter is true.
    pub fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let mask = self.evaluate(batch)?;
        filter_record_batch(batch, &mask).map_err(|e| StorageError::arrow("Failed to filter batch", e))
    }

    /// Split a conjunction into its AND-ed parts.
    pub(crate) fn into_conjuncts(self) -> Vec<Filter> {
        match self {
            Filter::And(l, r) => {
                let mut parts = l.into_conjuncts();
                parts.extend(r.into_conjuncts());
                parts
            }
            other => vec![other],
        }
    }

    /// Whether each of `containers` row groups may hold a matching row.
    ///
    /// `stats` returns the per-container minimum and maximum of a column, or
    /// `None` when unknown. Missing or null statistics never rule a
    /// container out.
    pub(crate) fn may_match(
        &self,
        stats: &dyn Fn(&str) -> Option<(ArrayRef, ArrayRef)>,
        containers: usize,
    ) -> Vec<bool> {
        match self.bounds(stats, containers) {
            Some(mask) => (0..containers)
                .map(|i| mask.is_null(i) || mask.value(i))
                .collect(),
            None => vec![true; containers],
        }
    }

    /// Kleene mask of "some row may match" per container; `None` is unknown
    /// everywhere.
    fn bounds(
        &self,
        stats: &dyn Fn(&str) -> Option<(ArrayRef, ArrayRef)>,
        containers: usize,
    ) -> Option<BooleanArray> {
        match self {
            Filter::Compare { column, op, value } if *value != ScalarValue::Null => {
                let (mins, maxes) = stats(column)?;
                if mins.len() != containers || maxes.len() != containers {
                    return None;
                }
                let mask = match op {
                    CompareOp::Eq => and_kleene(
                        &compare(&mins, CompareOp::LtEq, value).ok()?,
                        &compare(&maxes, CompareOp::GtEq, value).ok()?,
                    )
                    .ok()?,
                    CompareOp::Lt | CompareOp::LtEq => compare(&mins, *op, value).ok()?,
                    CompareOp::Gt | CompareOp::GtEq => compare(&maxes, *op, value).ok()?,
                    CompareOp::NotEq => return None,
                };
                Some(mask)
            }
            Filter::In { column, values } => values
                .iter()
                .map(|value| col(column.as_str()).eq(value.clone()))
                .reduce(Filter::or)
                .and_then(|any| any.bounds(stats, containers)),
            Filter::And(l, r) => {
                match (l.bounds(stats, containers), r.bounds(stats, containers)) {
                    (Some(l), Some(r)) => and_kleene(&l, &r).ok(),
                    (Some(one), None) | (None, Some(one)) => Some(one),
                    (None, None) => None,
                }
            }
            Filter::Or(l, r) => {
                let l = l.bounds(stats, containers)?;
                let r = r.bounds(stats, containers)?;
                or_kleene(&l, &r).ok()
            }
            _ => None,
        }
    }

    /// True when the filter holds for the single row of `batch`.
    pub(crate) fn matches_row(&self, batch: &RecordBatch) -> Result<bool> {
        let mask = self.evaluate(batch)?;
        Ok(mask.len() == 1 && mask.is_valid(0) && mask.value(0))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Compare { column, op, value } => write!(f, "{} {} {}", column, op, value),
            Filter::IsNull(column) => write!(f, "{} IS NULL", column),
            Filter::IsNotNull(column) => write!(f, "{} IS NOT NULL", column),
            Filter::In { column, values } => {
                let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{} IN ({})", column, rendered.join(", "))
            }
            Filter::And(l, r) => write!(f, "({} AND {})", l, r),
            Filter::Or(l, r) => write!(f, "({} OR {})", l, r),
            Filter::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

fn column_of<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch.column_by_name(name).ok_or_else(|| {
        StorageError::schema(format!("filter references unknown column '{}'", name))
    })
}

fn is_integer(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn compare(array: &ArrayRef, op: CompareOp, value: &ScalarValue) -> Result<BooleanArray> {
    if *value == ScalarValue::Null {
        // Comparison with null is unknown for every row.
        return Ok(BooleanArray::from(vec![None::<bool>; array.len()]));
    }

    // A fractional literal against an integer column compares as floats.
    let (lhs, target) = if matches!(value, ScalarValue::Float64(_)) && is_integer(array.data_type())
    {
        let widened = cast(array.as_ref(), &DataType::Float64)
            .map_err(|e| StorageError::arrow("Failed to widen column for comparison", e))?;
        (widened, DataType::Float64)
    } else {
        (array.clone(), array.data_type().clone())
    };

    let literal = cast(value.to_array().as_ref(), &target).map_err(|e| {
        StorageError::schema(format!("literal {} cannot be compared with {}: {}", value, target, e))
    })?;
    if literal.is_null(0) {
        return Err(StorageError::schema(format!(
            "literal {} is not a valid {}",
            value, target
        )));
    }
    let rhs = Scalar::new(literal);

    let result = match op {
        CompareOp::Eq => cmp::eq(&lhs, &rhs),
        CompareOp::NotEq => cmp::neq(&lhs, &rhs),
        CompareOp::Lt => cmp::lt(&lhs, &rhs),
        CompareOp::LtEq => cmp::lt_eq(&lhs, &rhs),
        CompareOp::Gt => cmp::gt(&lhs, &rhs),
        CompareOp::GtEq => cmp::gt_eq(&lhs, &rhs),
    };
    result.map_err(|e| StorageError::arrow(format!("Failed to evaluate {}", op), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Field;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("n", DataType::Int64, true),
            Field::new("s", DataType::Utf8, true),
            Field::new("x", DataType::Float64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(0), Some(1), None, Some(3)])),
                Arc::new(StringArray::from(vec![Some("a"), None, Some("c"), Some("a")])),
                Arc::new(Float64Array::from(vec![0.5, 1.5, 2.5, 3.5])),
            ],
        )
        .unwrap()
    }

    fn rows(filter: Filter) -> usize {
        filter.apply(&batch()).unwrap().num_rows()
    }

    #[test]
    fn comparisons_drop_null_rows() {
        assert_eq!(rows(col("n").eq(0)), 1);
        assert_eq!(rows(col("n").not_eq(0)), 2);
        assert_eq!(rows(col("n").gt_eq(1)), 2);
        assert_eq!(rows(col("s").eq("a")), 2);
        assert_eq!(rows(col("x").lt(2)), 2);
    }

    #[test]
    fn fractional_literal_against_integers() {
        assert_eq!(rows(col("n").lt(1.5)), 2);
        assert_eq!(rows(col("n").gt(0.5)), 2);
    }

    #[test]
    fn null_checks_and_membership() {
        assert_eq!(rows(col("n").is_null()), 1);
        assert_eq!(rows(col("s").is_not_null()), 3);
        assert_eq!(rows(col("n").is_in([0, 3])), 2);
        assert_eq!(rows(col("n").is_in(Vec::<i64>::new())), 0);
    }

    #[test]
    fn kleene_combinators() {
        assert_eq!(rows(col("n").eq(0).or(col("s").eq("c"))), 2);
        assert_eq!(rows(col("n").gt(0).and(col("s").eq("a"))), 1);
        // NOT of unknown stays unknown, so the null row is still dropped.
        assert_eq!(rows(!col("n").eq(0)), 2);
        assert_eq!(rows(col("n").eq(ScalarValue::Null)), 0);
    }

    #[test]
    fn columns_and_validation() {
        let filter = col("s").eq("a").and(col("n").gt(0)).or(col("n").is_null());
        assert_eq!(filter.columns(), vec!["n", "s"]);
        assert!(filter.validate(&batch().schema()).is_ok());

        let unknown = col("missing").eq(1);
        assert!(matches!(
            unknown.validate(&batch().schema()),
            Err(StorageError::Schema { .. })
        ));
        assert!(unknown.evaluate(&batch()).is_err());
    }

    #[test]
    fn uncastable_literal_is_a_schema_error() {
        let err = col("n").eq("not-a-number").evaluate(&batch()).unwrap_err();
        assert!(matches!(err, StorageError::Schema { .. }));
    }

    #[test]
    fn conjuncts_flatten_nested_ands() {
        let filter = col("a").eq(1).and(col("b").eq(2).and(col("c").eq(3)));
        let parts = filter.into_conjuncts();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2], col("c").eq(3));

        let or = col("a").eq(1).or(col("b").eq(2));
        assert_eq!(or.clone().into_conjuncts(), vec![or]);
    }

    #[test]
    fn statistics_rule_out_row_groups() {
        // Three row groups: [0, 9], [10, 19] and one without statistics.
        let mins: ArrayRef = Arc::new(Int64Array::from(vec![Some(0), Some(10), None]));
        let maxes: ArrayRef = Arc::new(Int64Array::from(vec![Some(9), Some(19), None]));
        let stats = |name: &str| (name == "n").then(|| (mins.clone(), maxes.clone()));

        assert_eq!(col("n").eq(12).may_match(&stats, 3), vec![false, true, true]);
        assert_eq!(col("n").lt(5).may_match(&stats, 3), vec![true, false, true]);
        assert_eq!(col("n").gt_eq(10).may_match(&stats, 3), vec![false, true, true]);
        assert_eq!(col("n").is_in([3, 30]).may_match(&stats, 3), vec![true, false, true]);
        assert_eq!(
            col("n").eq(3).or(col("n").eq(15)).may_match(&stats, 3),
            vec![true, true, true]
        );
        assert_eq!(
            col("n").eq(3).and(col("s").eq("x")).may_match(&stats, 3),
            vec![true, false, true]
        );
        // Unknown columns, inequality and NOT keep every group.
        assert_eq!(col("s").eq("x").may_match(&stats, 3), vec![true; 3]);
        assert_eq!(col("n").not_eq(3).may_match(&stats, 3), vec![true; 3]);
        assert_eq!((!col("n").eq(3)).may_match(&stats, 3), vec![true; 3]);
    }

    #[test]
    fn conjunction_of_many() {
        assert!(Filter::all(Vec::new()).is_none());
        let all = Filter::all([col("n").gt(0), col("s").eq("a")]).unwrap();
        assert_eq!(all.to_string(), "(n > 0 AND s == 'a')");
    }
}
