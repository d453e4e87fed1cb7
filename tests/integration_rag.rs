#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end ingestion, indexing and answering with offline collaborators

use std::fs;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use discharge_assist::AssistError;
use discharge_assist::commands::Services;
use discharge_assist::config::{Config, EmbeddingProvider};
use discharge_assist::embeddings::{Embedder, EmbeddingError, HashingEmbedder};
use discharge_assist::index::IndexOrigin;
use discharge_assist::ingestion::IngestionError;
use discharge_assist::llm::{GenerationRequest, InferenceError, LanguageModel};
use discharge_assist::patients::PatientRecord;
use discharge_assist::rag::{FALLBACK_ANSWER, NO_PATIENT_DATA};
use indicatif::ProgressBar;
use tempfile::TempDir;

const GUIDE: &str = "\
Heart failure patients should weigh themselves every morning and report a gain of two pounds overnight.
Chronic kidney disease stage 3 patients should limit potassium, phosphorus and sodium in their kidney diet.
Diabetes management after discharge includes checking blood glucose before meals and at bedtime daily.
";

const REPLY: &str = "Follow a low potassium kidney diet and keep your nephrology appointments.";

/// Returns a fixed reply, or fails, and records every prompt it was given
struct RecordingModel {
    reply: Result<String, InferenceError>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(error: InferenceError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .last()
            .cloned()
            .expect("model was called")
    }
}

impl LanguageModel for RecordingModel {
    fn model_id(&self) -> String {
        "recording".to_string()
    }

    fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .push(request.user.clone());
        self.reply.clone()
    }
}

/// Embedding backend that is never reachable
struct UnreachableEmbedder;

impl Embedder for UnreachableEmbedder {
    fn model_id(&self) -> String {
        HashingEmbedder::new(256).model_id()
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Request("connection refused".to_string()))
    }
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config {
        base_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    config.embedding.provider = EmbeddingProvider::Hashing;
    config.chunking.chunk_size = 100;
    config
}

fn services(config: &Config, model: Arc<RecordingModel>) -> Services {
    Services::from_parts(config.clone(), Arc::new(HashingEmbedder::new(256)), model)
}

fn write_guide(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("discharge_guide.txt");
    fs::write(&path, GUIDE).expect("should write guide");
    path
}

#[test]
fn ckd_question_is_answered_from_kidney_guidance() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let config = test_config(&dir);
    let model = RecordingModel::replying(REPLY);
    let services = services(&config, Arc::clone(&model));

    let (count, origin) = services
        .ingest(&write_guide(&dir), &ProgressBar::hidden())
        .expect("ingestion should succeed");
    assert_eq!(count, 3);
    assert_eq!(origin, IndexOrigin::Built);

    let answer = services
        .ask("What diet should I follow for chronic kidney disease stage 3?", None, 2)
        .expect("ask should succeed");

    assert_eq!(answer.sources.len(), 2);
    assert!(answer.sources[0].text.contains("kidney"));
    assert!(answer.sources[0].score <= answer.sources[1].score);
    assert_eq!(answer.answer, REPLY);
    assert!(answer.degraded.is_none());

    let prompt = model.last_prompt();
    assert!(prompt.contains("=== Medical Context from Knowledge Base ==="));
    assert!(prompt.contains("limit potassium"));
    assert!(prompt.contains(NO_PATIENT_DATA));
}

#[test]
fn persisted_index_is_reused_by_a_new_process() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let config = test_config(&dir);

    let first = services(&config, RecordingModel::replying(REPLY));
    first
        .ingest(&write_guide(&dir), &ProgressBar::hidden())
        .expect("ingestion should succeed");
    let before = first
        .index()
        .search("blood glucose before meals", 3)
        .expect("search should succeed");

    let second = services(&config, RecordingModel::replying(REPLY));
    let origin = second
        .load_index(false, &ProgressBar::hidden())
        .expect("load should succeed");
    assert_eq!(origin, IndexOrigin::Loaded);

    let after = second
        .index()
        .search("blood glucose before meals", 3)
        .expect("search should succeed");
    assert_eq!(before, after);
}

#[test]
fn explicit_rebuild_reencodes_stored_chunks() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let config = test_config(&dir);

    let first = services(&config, RecordingModel::replying(REPLY));
    first
        .ingest(&write_guide(&dir), &ProgressBar::hidden())
        .expect("ingestion should succeed");

    let second = services(&config, RecordingModel::replying(REPLY));
    let origin = second
        .load_index(true, &ProgressBar::hidden())
        .expect("rebuild should succeed");
    assert_eq!(origin, IndexOrigin::Built);
    assert_eq!(second.index().len(), 3);
}

#[test]
fn patient_history_is_included_in_the_prompt() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let config = test_config(&dir);
    let model = RecordingModel::replying(REPLY);
    let services = services(&config, Arc::clone(&model));
    services
        .ingest(&write_guide(&dir), &ProgressBar::hidden())
        .expect("ingestion should succeed");

    let mut record = PatientRecord::new("John Smith");
    record.primary_diagnosis = Some("Chronic Kidney Disease Stage 3".to_string());
    record.discharge_date = NaiveDate::from_ymd_opt(2024, 3, 1);
    record.medications = vec!["Lisinopril 10mg".to_string()];
    services
        .patients()
        .add(record)
        .expect("record should be stored");

    services
        .ask("Can I eat bananas?", Some("  john smith "), 2)
        .expect("ask should succeed");

    let prompt = model.last_prompt();
    assert!(prompt.contains("=== Patient Medical History ==="));
    assert!(prompt.contains("Name: John Smith"));
    assert!(prompt.contains("Lisinopril 10mg"));
    assert!(!prompt.contains(NO_PATIENT_DATA));
}

#[test]
fn unknown_patient_falls_back_to_no_personal_data() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let config = test_config(&dir);
    let model = RecordingModel::replying(REPLY);
    let services = services(&config, Arc::clone(&model));

    services
        .ask("How much water should I drink?", Some("Nobody"), 3)
        .expect("ask should succeed");

    assert!(model.last_prompt().contains(NO_PATIENT_DATA));
}

#[test]
fn model_failure_degrades_to_fallback_answer() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let config = test_config(&dir);
    let services = services(
        &config,
        RecordingModel::failing(InferenceError::Status {
            code: 503,
            message: "model is loading".to_string(),
        }),
    );
    services
        .ingest(&write_guide(&dir), &ProgressBar::hidden())
        .expect("ingestion should succeed");

    let answer = services
        .ask("What should I eat with kidney disease?", None, 1)
        .expect("ask should succeed");

    assert_eq!(answer.answer, FALLBACK_ANSWER);
    assert_eq!(answer.sources.len(), 1);
    assert!(!answer.context.is_empty());
    assert!(matches!(
        answer.degraded,
        Some(InferenceError::Status { code: 503, .. })
    ));
}

#[test]
fn empty_corpus_answers_without_context() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let config = test_config(&dir);
    let model = RecordingModel::replying(REPLY);
    let services = services(&config, Arc::clone(&model));

    let origin = services
        .load_index(false, &ProgressBar::hidden())
        .expect("load should succeed");
    assert_eq!(origin, IndexOrigin::Empty);

    let answer = services
        .ask("What is CKD?", None, 3)
        .expect("ask should succeed");
    assert!(answer.sources.is_empty());
    assert!(answer.context.is_empty());
    assert_eq!(answer.answer, REPLY);
}

#[test]
fn unsupported_documents_are_rejected() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let config = test_config(&dir);
    let services = services(&config, RecordingModel::replying(REPLY));
    let path = dir.path().join("guide.docx");
    fs::write(&path, "binary").expect("should write file");

    assert!(matches!(
        services.ingest(&path, &ProgressBar::hidden()),
        Err(AssistError::Ingestion(IngestionError::UnsupportedFormat(_)))
    ));
    assert!(services.index().is_empty());
}

#[test]
fn failed_reingest_never_reuses_the_old_index() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let config = test_config(&dir);
    let original = dir.path().join("kidney.txt");
    fs::write(&original, "Limit potassium and phosphorus in your kidney diet.")
        .expect("should write document");
    services(&config, RecordingModel::replying(REPLY))
        .ingest(&original, &ProgressBar::hidden())
        .expect("ingestion should succeed");

    let replacement = "Call your cardiologist if your ankles swell.";
    let path = dir.path().join("cardiology.txt");
    fs::write(&path, replacement).expect("should write document");
    let offline = Services::from_parts(
        config.clone(),
        Arc::new(UnreachableEmbedder),
        RecordingModel::replying(REPLY),
    );
    assert!(offline.ingest(&path, &ProgressBar::hidden()).is_err());

    let restarted = services(&config, RecordingModel::replying(REPLY));
    let origin = restarted
        .load_index(false, &ProgressBar::hidden())
        .expect("load should succeed");
    assert_eq!(origin, IndexOrigin::Built);
    assert_eq!(restarted.index().len(), 1);

    let results = restarted
        .index()
        .search(replacement, 1)
        .expect("search should succeed");
    assert_eq!(results[0].text, replacement);
    assert!(results[0].score < 1e-4);
}

#[test]
fn reingested_corpus_is_reloaded_after_restart() {
    let dir = TempDir::new().expect("should create TempDir successfully");
    let config = test_config(&dir);
    services(&config, RecordingModel::replying(REPLY))
        .ingest(&write_guide(&dir), &ProgressBar::hidden())
        .expect("ingestion should succeed");

    let path = dir.path().join("guide_v2.txt");
    fs::write(
        &path,
        "\
Stroke survivors should practice the swallowing exercises taught by the speech therapist.
Wound care after surgery means keeping the incision dry and watching for redness or fever.
Asthma action plans list the rescue inhaler dose and when to go to the emergency room.
",
    )
    .expect("should write document");
    let (count, _) = services(&config, RecordingModel::replying(REPLY))
        .ingest(&path, &ProgressBar::hidden())
        .expect("ingestion should succeed");
    assert_eq!(count, 3);

    let restarted = services(&config, RecordingModel::replying(REPLY));
    assert_eq!(
        restarted
            .load_index(false, &ProgressBar::hidden())
            .expect("load should succeed"),
        IndexOrigin::Loaded
    );
    let results = restarted
        .index()
        .search("keeping the incision dry", 1)
        .expect("search should succeed");
    assert!(results[0].text.contains("incision"));
}
