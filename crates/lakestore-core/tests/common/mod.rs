// Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use lakestore_core::{LocalBackend, Storage};
use tempfile::TempDir;

pub const ROWS: usize = 768;
pub const ZERO_PREGNANCIES: usize = 111;

pub const COLUMNS: [&str; 9] = [
    "Pregnancies",
    "Glucose",
    "BloodPressure",
    "SkinThickness",
    "Insulin",
    "BMI",
    "DiabetesPedigreeFunction",
    "Age",
    "Outcome",
];

pub fn diabetes_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("Pregnancies", DataType::Int64, false),
        Field::new("Glucose", DataType::Int64, false),
        Field::new("BloodPressure", DataType::Int64, false),
        Field::new("SkinThickness", DataType::Int64, false),
        Field::new("Insulin", DataType::Int64, false),
        Field::new("BMI", DataType::Float64, false),
        Field::new("DiabetesPedigreeFunction", DataType::Float64, false),
        Field::new("Age", DataType::Int64, false),
        Field::new("Outcome", DataType::Int64, false),
    ]))
}

fn pregnancies(i: usize) -> i64 {
    if i < ZERO_PREGNANCIES {
        0
    } else {
        1 + (i % 16) as i64
    }
}

/// Deterministic 768-row table shaped like the Pima diabetes dataset.
/// Exactly 111 rows have `Pregnancies == 0`.
pub fn diabetes_rows(range: std::ops::Range<usize>) -> RecordBatch {
    let ints = |f: fn(usize) -> i64| -> Arc<Int64Array> {
        Arc::new(Int64Array::from_iter_values(range.clone().map(f)))
    };
    let floats = |f: fn(usize) -> f64| -> Arc<Float64Array> {
        Arc::new(Float64Array::from_iter_values(range.clone().map(f)))
    };

    RecordBatch::try_new(
        diabetes_schema(),
        vec![
            ints(pregnancies),
            ints(|i| 70 + (i * 7 % 130) as i64),
            ints(|i| 40 + (i * 3 % 80) as i64),
            ints(|i| (i * 5 % 60) as i64),
            ints(|i| (i * 11 % 400) as i64),
            floats(|i| 18.0 + (i % 300) as f64 / 10.0),
            floats(|i| 0.078 + (i % 200) as f64 / 100.0),
            ints(|i| 21 + (i % 60) as i64),
            ints(|i| (i % 3 == 0) as i64),
        ],
    )
    .expect("Failed to build diabetes fixture")
}

pub fn diabetes() -> RecordBatch {
    diabetes_rows(0..ROWS)
}

/// Storage over a fresh temporary root. Keep the `TempDir` alive for the
/// duration of the test.
pub fn local_storage() -> (TempDir, Storage) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = LocalBackend::new_at(dir.path()).expect("Failed to create local backend");
    (dir, Storage::new(Arc::new(backend)))
}
