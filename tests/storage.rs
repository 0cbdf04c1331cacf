//! Store-level guarantees: content-addressed dedup, deletion atomicity,
//! integrity reporting, lineage listings.

use eegbench::error::EegError;
use eegbench::hashing::array_content_hash;
use eegbench::preprocess::{Pipeline, ResampleStep, Transform};
use eegbench::storage::EegDatabase;
use ndarray::{Array2, ArrayD};
use tempfile::TempDir;

fn open_store() -> (TempDir, EegDatabase) {
    let dir = TempDir::new().expect("tempdir");
    let db = EegDatabase::open(dir.path().join("store")).expect("open store");
    (dir, db)
}

fn test_data(seed: u64) -> ArrayD<f64> {
    Array2::from_shape_fn((4, 250), |(c, t)| {
        ((seed + c as u64 * 1000 + t as u64) % 997) as f64 * 0.01
    })
    .into_dyn()
}

fn channel_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("Ch{}", i + 1)).collect()
}

fn add_raw(db: &EegDatabase, filename: &str, data: &ArrayD<f64>) -> String {
    db.add_dataset(
        filename,
        &array_content_hash(data),
        256.0,
        &channel_names(data.shape()[0]),
        None,
        data,
    )
    .expect("add dataset")
}

#[test]
fn same_payload_bytes_yield_one_record() {
    let (_dir, db) = open_store();
    let data = test_data(1);

    let first = add_raw(&db, "a.csv", &data);
    let second = add_raw(&db, "b.csv", &data);

    assert_eq!(first, second);
    assert_eq!(db.list_datasets().expect("list").len(), 1);

    // Exactly one payload file exists for that content.
    assert!(db.payload_path(&first).exists());
    let arrays_dir = db.payload_path(&first).parent().expect("dir").to_path_buf();
    let payload_files = std::fs::read_dir(arrays_dir).expect("read dir").count();
    assert_eq!(payload_files, 1);
}

#[test]
fn different_payloads_get_distinct_records() {
    let (_dir, db) = open_store();
    let a = add_raw(&db, "a.csv", &test_data(1));
    let b = add_raw(&db, "b.csv", &test_data(2));
    assert_ne!(a, b);
    assert_eq!(db.list_datasets().expect("list").len(), 2);
}

#[test]
fn delete_removes_row_and_payload() {
    let (_dir, db) = open_store();
    let data = test_data(3);
    let id = add_raw(&db, "a.csv", &data);
    let payload = db.payload_path(&id);
    assert!(payload.exists());

    assert!(db.delete_dataset(&id).expect("delete"));
    assert!(!payload.exists());
    assert!(db.get_dataset(&id).expect("get").is_none());
    assert!(db.get_dataset_data(&id).expect("get data").is_none());
    assert!(db.list_datasets().expect("list").is_empty());

    // A second delete reports nothing was there.
    assert!(!db.delete_dataset(&id).expect("re-delete"));
}

#[test]
fn missing_payload_is_reported_not_masked() {
    let (_dir, db) = open_store();
    let id = add_raw(&db, "a.csv", &test_data(4));

    std::fs::remove_file(db.payload_path(&id)).expect("remove payload behind the store's back");

    assert!(db.get_dataset(&id).expect("row still present").is_some());
    match db.get_dataset_data(&id) {
        Err(EegError::StorageIntegrity(_)) => {}
        other => panic!("expected StorageIntegrity, got {other:?}"),
    }
}

#[test]
fn unknown_id_reads_as_none() {
    let (_dir, db) = open_store();
    assert!(db.get_dataset("missing").expect("get").is_none());
    assert!(db.get_dataset_data("missing").expect("get data").is_none());
    assert!(db.get_processed("missing").expect("get").is_none());
    assert!(db.get_features("missing").expect("get").is_none());
}

#[test]
fn listings_are_newest_first() {
    let (_dir, db) = open_store();
    let first = add_raw(&db, "old.csv", &test_data(5));
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = add_raw(&db, "new.csv", &test_data(6));

    let listed = db.list_datasets().expect("list");
    assert_eq!(listed[0].id, second);
    assert_eq!(listed[1].id, first);
}

#[test]
fn processed_records_link_to_their_parent() {
    let (_dir, db) = open_store();
    let raw = test_data(7);
    let parent = add_raw(&db, "raw.csv", &raw);

    let mut pipeline = Pipeline::default();
    pipeline.add_step(Box::new(ResampleStep::new(128.0, 256.0)));
    let step = ResampleStep::new(128.0, 256.0);
    let processed_data = step.transform(&raw).expect("resample");

    let proc_a = db
        .add_processed(
            &parent,
            &pipeline.to_config(),
            128.0,
            &channel_names(4),
            None,
            &processed_data,
        )
        .expect("add processed");
    let proc_b = db
        .add_processed(
            &parent,
            &pipeline.to_config(),
            128.0,
            &channel_names(4),
            None,
            &processed_data,
        )
        .expect("add processed again");

    // Derived records are never deduplicated.
    assert_ne!(proc_a, proc_b);

    let children = db.list_processed(Some(&parent)).expect("list children");
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|c| c.parent_id == parent));
    assert!(db.list_processed(Some("other")).expect("list").is_empty());

    let record = db.get_processed(&proc_a).expect("get").expect("present");
    assert_eq!(record.parent_id, parent);
    assert_eq!(record.n_samples, 125);
    assert_eq!(record.pipeline_config, pipeline.to_config());
}

#[test]
fn deleting_a_parent_leaves_children_readable() {
    let (_dir, db) = open_store();
    let raw = test_data(8);
    let parent = add_raw(&db, "raw.csv", &raw);
    let proc_id = db
        .add_processed(
            &parent,
            &Pipeline::default().to_config(),
            256.0,
            &channel_names(4),
            None,
            &raw,
        )
        .expect("add processed");

    assert!(db.delete_dataset(&parent).expect("delete parent"));

    // The child row and payload survive; its parent pointer dangles.
    let record = db.get_processed(&proc_id).expect("get").expect("present");
    assert_eq!(record.parent_id, parent);
    assert!(db.get_dataset(&record.parent_id).expect("parent lookup").is_none());
    assert!(db.get_processed_data(&proc_id).expect("data").is_some());
}

#[test]
fn feature_sets_round_trip_with_labels() {
    let (_dir, db) = open_store();
    let parent = add_raw(&db, "raw.csv", &test_data(9));
    let features = Array2::from_shape_fn((6, 3), |(i, j)| (i * 10 + j) as f64);
    let labels = vec![0, 1, 0, 1, 0, 1];

    let feat_id = db
        .add_features(
            &parent,
            &serde_json::json!([{ "name": "time_domain", "params": {} }]),
            &features,
            Some(&labels),
            None,
        )
        .expect("add features");

    let record = db.get_features(&feat_id).expect("get").expect("present");
    assert_eq!(record.n_instances, 6);
    assert_eq!(record.n_features, 3);
    assert_eq!(record.labels.as_deref(), Some(labels.as_slice()));

    let (matrix, loaded_labels) = db
        .get_features_data(&feat_id)
        .expect("data")
        .expect("present");
    assert_eq!(matrix, features);
    assert_eq!(loaded_labels, Some(labels));

    assert!(db.delete_features(&feat_id).expect("delete"));
    assert!(db.get_features(&feat_id).expect("get").is_none());
}
