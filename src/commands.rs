use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::agents::{AgentRole, DuckDuckGoSearch, Orchestrator, Receptionist};
use crate::config::{Config, EmbeddingProvider};
use crate::embeddings::{self, Embedder, OllamaClient};
use crate::index::{EmbeddingIndex, IndexOrigin, IndexStore};
use crate::ingestion::{self, ChunkStore};
use crate::llm::{ChatCompletionsClient, LanguageModel};
use crate::patients::{PatientLookup, PatientRecord, PatientStore};
use crate::rag::{Answer, RagAssistant};
use crate::AssistError;

const EXIT_WORDS: &[&str] = &["exit", "quit", "bye"];

/// Explicitly constructed collaborators shared by every command
#[derive(Clone)]
pub struct Services {
    config: Config,
    chunk_store: ChunkStore,
    index: Arc<EmbeddingIndex>,
    model: Arc<dyn LanguageModel>,
    assistant: Arc<RagAssistant>,
    patients: Arc<PatientStore>,
}

impl Services {
    /// Build the embedder and language model described by `config`
    #[inline]
    pub fn open(config: Config) -> crate::Result<Self> {
        let embedder = embeddings::from_config(&config.embedding)
            .map_err(|e| AssistError::Config(format!("Failed to set up embedder: {e:#}")))?;
        let client = ChatCompletionsClient::new(&config.llm).map_err(|e| {
            AssistError::Config(format!("Failed to set up language model client: {e:#}"))
        })?;
        Ok(Self::from_parts(config, embedder, Arc::new(client)))
    }

    /// Assemble services from already constructed collaborators
    #[inline]
    pub fn from_parts(
        config: Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let index = Arc::new(EmbeddingIndex::new(
            embedder,
            IndexStore::new(config.index_dir()),
        ));
        let assistant = Arc::new(
            RagAssistant::new(Arc::clone(&index), Arc::clone(&model))
                .with_max_tokens(config.llm.max_tokens)
                .with_deadline(config.llm.timeout()),
        );

        Self {
            chunk_store: ChunkStore::new(config.chunks_path()),
            patients: Arc::new(PatientStore::new(config.patients_path())),
            config,
            index,
            model,
            assistant,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    #[inline]
    pub fn assistant(&self) -> &Arc<RagAssistant> {
        &self.assistant
    }

    #[inline]
    pub fn patients(&self) -> &Arc<PatientStore> {
        &self.patients
    }

    /// Ingest a document, replace the stored chunks and rebuild the index.
    ///
    /// The old index artifacts are removed before the chunks are replaced, so a
    /// failed rebuild leaves nothing that a later load could pair with the new chunks.
    #[inline]
    pub fn ingest(
        &self,
        path: &Path,
        progress: &ProgressBar,
    ) -> crate::Result<(usize, IndexOrigin)> {
        let chunks = ingestion::ingest(path, &self.config.chunking)?;
        if let Some(store) = self.index.store() {
            store
                .clear()
                .map_err(|e| AssistError::Index(format!("{e:#}")))?;
        }
        self.chunk_store.save(&chunks)?;

        let count = chunks.len();
        let origin = self
            .index
            .rebuild(chunks, progress)
            .map_err(|e| AssistError::Index(format!("{e:#}")))?;
        Ok((count, origin))
    }

    /// Load the persisted index for the stored chunks, or build it
    #[inline]
    pub fn load_index(
        &self,
        rebuild: bool,
        progress: &ProgressBar,
    ) -> crate::Result<IndexOrigin> {
        let chunks = match self.chunk_store.load()? {
            Some(chunks) => chunks,
            None => {
                warn!(
                    "No chunk store at {}; run `ingest` first",
                    self.chunk_store.path().display()
                );
                Vec::new()
            }
        };

        let origin = if rebuild {
            self.index.rebuild(chunks, progress)
        } else {
            self.index.build_or_load(chunks, progress)
        };
        origin.map_err(|e| AssistError::Index(format!("{e:#}")))
    }

    /// Answer one question, personalized when `patient` names a known record
    #[inline]
    pub fn ask(
        &self,
        query: &str,
        patient: Option<&str>,
        top_k: usize,
    ) -> crate::Result<Answer> {
        let record = match patient {
            Some(name) => {
                let record = self
                    .patients
                    .lookup(name)
                    .map_err(|e| AssistError::Patients(format!("{e:#}")))?;
                if record.is_none() {
                    warn!("No patient history found for {}", name);
                }
                record
            }
            None => None,
        };

        Ok(self
            .assistant
            .answer_for_patient(query, top_k, record.as_ref()))
    }

    #[inline]
    pub fn orchestrator(&self) -> crate::Result<Orchestrator> {
        let web = DuckDuckGoSearch::new()?;
        Ok(Orchestrator::new(
            Receptionist::new(Arc::clone(&self.model)),
            Arc::clone(&self.assistant),
            Arc::new(web),
            Arc::clone(&self.patients) as Arc<dyn PatientLookup>,
        )
        .with_top_k(self.config.retrieval.top_k))
    }
}

fn embedding_progress() -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(0).with_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} Embedding chunks")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    }
}

async fn open_services() -> Result<Services> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let services = tokio::task::spawn_blocking(move || Services::open(config))
        .await
        .context("Service setup task panicked")??;
    Ok(services)
}

async fn blocking<T, F>(services: &Services, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(Services) -> Result<T> + Send + 'static,
{
    let services = services.clone();
    tokio::task::spawn_blocking(move || work(services))
        .await
        .context("Background task panicked")?
}

/// Ingest a source document and build the index over it
#[inline]
pub async fn ingest(path: PathBuf) -> Result<()> {
    info!("Ingesting {}", path.display());
    let services = open_services().await?;

    let (count, _) = blocking(&services, move |services| {
        Ok(services.ingest(&path, &embedding_progress())?)
    })
    .await?;

    println!("Ingested {} chunks", count);
    println!(
        "Chunks saved to: {}",
        services.config().chunks_path().display()
    );
    println!("Index saved to: {}", services.config().index_dir().display());
    Ok(())
}

/// Load or rebuild the index from the stored chunks
#[inline]
pub async fn index(rebuild: bool) -> Result<()> {
    let services = open_services().await?;

    let origin = blocking(&services, move |services| {
        Ok(services.load_index(rebuild, &embedding_progress())?)
    })
    .await?;

    let snapshot = services.index().snapshot();
    match origin {
        IndexOrigin::Loaded => {
            println!("Loaded index with {} vectors", snapshot.embedding_count());
        }
        IndexOrigin::Built => {
            println!("Built index with {} vectors", snapshot.embedding_count());
        }
        IndexOrigin::Empty => {
            println!("No chunks stored. Use 'discharge-assist ingest <path>' first.");
        }
    }
    Ok(())
}

/// Answer a single clinical question
#[inline]
pub async fn ask(
    query: String,
    patient: Option<String>,
    top_k: Option<usize>,
    show_context: bool,
) -> Result<()> {
    let services = open_services().await?;
    let top_k = top_k.unwrap_or(services.config().retrieval.top_k);

    let answer = blocking(&services, move |services| {
        services.load_index(false, &embedding_progress())?;
        Ok(services.ask(&query, patient.as_deref(), top_k)?)
    })
    .await?;

    if show_context {
        println!("{}", style("Context").bold().yellow());
        if answer.context.is_empty() {
            println!("{}", style("(no context retrieved)").dim());
        }
        for source in &answer.sources {
            println!(
                "{} {}",
                style(format!("[chunk {} | distance {:.4}]", source.chunk_id, source.score)).dim(),
                source.text
            );
        }
        println!();
    }

    println!("{}", style("Answer").bold().green());
    println!("{}", answer.answer);
    if let Some(reason) = &answer.degraded {
        eprintln!("{} {}", style("⚠ Generation failed:").yellow(), reason);
    }
    Ok(())
}

/// Interactive conversation routed between the agents
#[inline]
pub async fn chat(patient: Option<String>) -> Result<()> {
    let services = open_services().await?;

    blocking(&services, move |services| {
        services.load_index(false, &embedding_progress())?;
        let orchestrator = services.orchestrator()?;

        let patient = match patient {
            Some(name) => name,
            None => Input::<String>::new()
                .with_prompt("Enter patient name")
                .interact_text()?,
        };
        let patient = patient.trim().to_string();
        info!(source = "Orchestrator", "Patient identified: {}", patient);

        println!(
            "{} {}",
            style("Receptionist:").bold().cyan(),
            orchestrator.open_session(&patient)
        );

        loop {
            let message: String = Input::new()
                .with_prompt("You")
                .allow_empty(true)
                .interact_text()?;
            let message = message.trim();

            if message.is_empty() {
                continue;
            }
            if EXIT_WORDS.contains(&message.to_lowercase().as_str()) {
                println!("Goodbye! Take care of your health.");
                info!(source = "Orchestrator", "Session ended by user");
                break;
            }

            let reply = orchestrator.handle(message, Some(&patient));
            let label = match reply.role {
                AgentRole::Receptionist => style(format!("{}:", reply.role)).bold().cyan(),
                AgentRole::Clinical => style(format!("{}:", reply.role)).bold().green(),
                AgentRole::WebResearch => style(format!("{}:", reply.role)).bold().magenta(),
            };
            println!("{} {}", label, reply.response);
        }

        Ok(())
    })
    .await
}

/// Fields accepted by `patient add`
#[derive(Debug, Clone, Default)]
pub struct NewPatient {
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub diagnosis: Option<String>,
    pub discharge_date: Option<NaiveDate>,
    pub medications: Vec<String>,
    pub symptoms: Vec<String>,
}

impl From<NewPatient> for PatientRecord {
    #[inline]
    fn from(patient: NewPatient) -> Self {
        Self {
            patient_name: patient.name,
            age: patient.age,
            gender: patient.gender,
            primary_diagnosis: patient.diagnosis,
            discharge_date: patient.discharge_date,
            medications: patient.medications,
            recent_symptoms: patient.symptoms,
            created_at: None,
        }
    }
}

/// Record a discharged patient
#[inline]
pub fn patient_add(patient: NewPatient) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let store = PatientStore::new(config.patients_path());

    let record = store.add(patient.into())?;
    println!("Added record for {}", record.patient_name);
    Ok(())
}

/// Print a patient's record
#[inline]
pub fn patient_show(name: &str) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let store = PatientStore::new(config.patients_path());

    match store.lookup(name)? {
        Some(record) => println!("{record}"),
        None => println!("No record found for {}", name),
    }
    Ok(())
}

/// Show paths, corpus size, index state and model identities
#[inline]
pub fn show_status() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    println!("📊 Discharge Assistant Status");
    println!("{}", "=".repeat(50));
    println!();

    println!("📁 Storage:");
    println!("   Base directory: {}", config.get_base_dir().display());

    let chunk_store = ChunkStore::new(config.chunks_path());
    let chunks = match chunk_store.load() {
        Ok(Some(chunks)) => {
            println!("   ✅ Chunks: {} stored", chunks.len());
            chunks
        }
        Ok(None) => {
            println!("   ⚠️  Chunks: none ingested yet");
            Vec::new()
        }
        Err(e) => {
            println!("   ❌ Chunks: unreadable - {:#}", e);
            Vec::new()
        }
    };

    let embedder = embeddings::from_config(&config.embedding)?;
    let model_id = embedder.model_id();
    let store = IndexStore::new(config.index_dir());
    let corpus = ingestion::corpus_fingerprint(&chunks);
    match store.load(&model_id, &corpus, chunks.len()) {
        Ok(loaded) => println!("   ✅ Index: {} vectors, ready", loaded.index.len()),
        Err(e) => println!("   ⚠️  Index: will be rebuilt on next use ({})", e),
    }

    match PatientStore::new(config.patients_path()).load_all() {
        Ok(records) => println!("   👤 Patients: {} records", records.len()),
        Err(e) => println!("   ❌ Patients: unreadable - {:#}", e),
    }

    println!();
    println!("🤖 Models:");
    println!("   Embedding: {}", model_id);
    if config.embedding.provider == EmbeddingProvider::Ollama {
        match OllamaClient::new(&config.embedding).and_then(|client| client.health_check()) {
            Ok(()) => println!("   ✅ Ollama: reachable, model available"),
            Err(e) => println!("   ❌ Ollama: {:#}", e),
        }
    }
    println!("   Language model: {}", config.llm.model);
    match config.llm.token() {
        Some(_) => println!("   ✅ Token: ${} is set", config.llm.token_env),
        None => println!("   ⚠️  Token: ${} is not set", config.llm.token_env),
    }
    println!("   Timeout: {:?}", config.llm.timeout());

    Ok(())
}
