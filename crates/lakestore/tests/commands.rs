use std::sync::Arc;

use lakestore::commands::{self, CopyArgs};
use lakestore_core::arrow::array::{Int64Array, StringArray};
use lakestore_core::arrow::datatypes::{DataType, Field, Schema};
use lakestore_core::arrow::record_batch::RecordBatch;
use lakestore_core::{FileFormat, LocalBackend, Storage, WriteOptions};

fn people() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("city", DataType::Utf8, false),
        Field::new("age", DataType::Int64, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec!["ada", "bo", "cy", "di", "ed", "flo"])),
            Arc::new(StringArray::from(vec![
                "oslo", "oslo", "rome", "rome", "rome", "lima",
            ])),
            Arc::new(Int64Array::from(vec![36, 41, 29, 52, 18, 64])),
        ],
    )
    .unwrap()
}

async fn seeded() -> (tempfile::TempDir, Storage) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(Arc::new(LocalBackend::new_at(dir.path()).unwrap()));
    let options = WriteOptions::parse(FileFormat::Parquet, ["city"], "snappy", "error").unwrap();
    storage
        .write(people(), FileFormat::Parquet, "people", &options)
        .await
        .unwrap();
    (dir, storage)
}

#[tokio::test]
async fn schema_reports_partitions_and_fragments() {
    let (_dir, storage) = seeded().await;
    let report = commands::schema(&storage, FileFormat::Parquet, "people")
        .await
        .unwrap();

    let names: Vec<&str> = report.fields.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["name", "age", "city"]);
    assert_eq!(report.partition_columns, vec!["city".to_string()]);
    assert_eq!(report.fragments, 3);
    assert!(report.to_string().contains("city: Utf8 [partition]"));
}

#[tokio::test]
async fn count_applies_every_filter() {
    let (_dir, storage) = seeded().await;

    let all = commands::count(&storage, FileFormat::Parquet, "people", &[], 2)
        .await
        .unwrap();
    assert_eq!(all, 6);

    let filters = vec!["city=rome".to_string(), "age>20".to_string()];
    let some = commands::count(&storage, FileFormat::Parquet, "people", &filters, 2)
        .await
        .unwrap();
    assert_eq!(some, 2);
}

#[tokio::test]
async fn count_rejects_bad_filters() {
    let (_dir, storage) = seeded().await;
    let filters = vec!["age".to_string()];
    assert!(commands::count(&storage, FileFormat::Parquet, "people", &filters, 10)
        .await
        .is_err());
}

#[tokio::test]
async fn copy_converts_to_delta() {
    let (_dir, storage) = seeded().await;
    let args = CopyArgs {
        from: FileFormat::Parquet,
        to: FileFormat::DeltaLake,
        partitions: Vec::new(),
        compression: "zstd".to_string(),
        behavior: "error".to_string(),
        filters: vec!["age<50".to_string()],
        batch_size: 1024,
    };

    let summary = commands::copy(&storage, "people", "people_delta", &args)
        .await
        .unwrap();
    assert_eq!(summary.rows, 4);

    let rows = commands::count(&storage, FileFormat::DeltaLake, "people_delta", &[], 1024)
        .await
        .unwrap();
    assert_eq!(rows, 4);

    // A second copy with the default policy hits the existing table
    assert!(commands::copy(&storage, "people", "people_delta", &args)
        .await
        .is_err());
}

#[tokio::test]
async fn copy_rejects_policies_of_the_other_format() {
    let (_dir, storage) = seeded().await;
    let args = CopyArgs {
        from: FileFormat::Parquet,
        to: FileFormat::Parquet,
        partitions: Vec::new(),
        compression: "snappy".to_string(),
        behavior: "append".to_string(),
        filters: Vec::new(),
        batch_size: 1024,
    };
    assert!(commands::copy(&storage, "people", "copy", &args).await.is_err());
}
