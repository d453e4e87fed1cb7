use super::*;
use tempfile::TempDir;

const MODEL: &str = "hashing-v1:3";
const CORPUS: &str = "3f1c0a";

fn sample() -> (FlatL2Index, Vec<Vec<f32>>) {
    let embeddings = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
    let index = FlatL2Index::from_vectors(&embeddings).expect("valid vectors");
    (index, embeddings)
}

fn saved_store() -> (TempDir, IndexStore) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = IndexStore::new(temp_dir.path().join("index"));
    let (index, embeddings) = sample();
    store
        .save(MODEL, CORPUS, &index, &embeddings)
        .expect("Failed to save index");
    (temp_dir, store)
}

#[test]
fn save_then_load_restores_alignment() {
    let (_temp_dir, store) = saved_store();

    assert!(store.exists());
    let loaded = store.load(MODEL, CORPUS, 2).expect("Failed to load index");

    let (index, embeddings) = sample();
    assert_eq!(loaded.index, index);
    assert_eq!(loaded.embeddings, embeddings);
    assert_eq!(loaded.index.len(), loaded.embeddings.len());
}

#[test]
fn missing_artifacts_are_reported() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = IndexStore::new(temp_dir.path());

    assert!(!store.exists());
    assert!(matches!(
        store.load(MODEL, CORPUS, 0),
        Err(IndexLoadError::Missing(_))
    ));
}

#[test]
fn missing_embedding_matrix_is_reported() {
    let (_temp_dir, store) = saved_store();
    fs::remove_file(store.embeddings_path()).expect("Failed to remove matrix");

    assert!(!store.exists());
    assert!(matches!(
        store.load(MODEL, CORPUS, 2),
        Err(IndexLoadError::Missing(path)) if path == store.embeddings_path()
    ));
}

#[test]
fn count_mismatch_is_rejected() {
    let (_temp_dir, store) = saved_store();

    assert!(matches!(
        store.load(MODEL, CORPUS, 3),
        Err(IndexLoadError::CountMismatch {
            stored: 2,
            expected: 3
        })
    ));
}

#[test]
fn model_mismatch_is_rejected() {
    let (_temp_dir, store) = saved_store();

    let err = store
        .load("ollama:nomic-embed-text:latest", CORPUS, 2)
        .expect_err("mismatched model must not load");
    assert!(matches!(err, IndexLoadError::ModelMismatch { .. }));
    assert!(err.to_string().contains(MODEL));
}

#[test]
fn corpus_change_is_rejected() {
    let (_temp_dir, store) = saved_store();

    let err = store
        .load(MODEL, "9b70e2", 2)
        .expect_err("index for other chunks must not load");
    assert!(matches!(
        err,
        IndexLoadError::CorpusMismatch { ref stored, ref expected }
            if stored == CORPUS && expected == "9b70e2"
    ));
}

#[test]
fn clear_removes_both_artifacts() {
    let (_temp_dir, store) = saved_store();

    store.clear().expect("Failed to clear index");
    assert!(!store.index_path().exists());
    assert!(!store.embeddings_path().exists());
    assert!(matches!(
        store.load(MODEL, CORPUS, 2),
        Err(IndexLoadError::Missing(_))
    ));

    store.clear().expect("clearing an empty store should succeed");
}

#[test]
fn garbage_artifact_is_malformed() {
    let (_temp_dir, store) = saved_store();
    fs::write(store.index_path(), "{ not json").expect("Failed to corrupt index");

    assert!(matches!(
        store.load(MODEL, CORPUS, 2),
        Err(IndexLoadError::Malformed { .. })
    ));
}

#[test]
fn diverging_artifacts_are_inconsistent() {
    let (_temp_dir, store) = saved_store();
    let (index, _) = sample();
    let other = vec![vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0]];
    store
        .save(MODEL, CORPUS, &index, &other)
        .expect("Failed to save index");

    assert!(matches!(
        store.load(MODEL, CORPUS, 2),
        Err(IndexLoadError::Inconsistent(_))
    ));
}

#[test]
fn save_leaves_no_staging_files() {
    let (_temp_dir, store) = saved_store();

    let names: Vec<String> = fs::read_dir(store.dir())
        .expect("Failed to list index dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();

    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|name| !name.ends_with(".tmp")));
}
