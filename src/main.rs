use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use discharge_assist::Result;
use discharge_assist::commands::{
    NewPatient, ask, chat, index, ingest, patient_add, patient_show, show_status,
};
use discharge_assist::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "discharge-assist")]
#[command(about = "Post-discharge care assistant with retrieval-augmented answers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure embedding, language model and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a PDF or text document into the knowledge base and index it
    Ingest {
        /// Path to the source document
        path: PathBuf,
    },
    /// Load the persisted index, or build it from the stored chunks
    Index {
        /// Re-encode every chunk even if a valid index is persisted
        #[arg(long)]
        rebuild: bool,
    },
    /// Ask a single clinical question
    Ask {
        /// The question to answer
        query: String,
        /// Personalize the answer with this patient's record
        #[arg(long)]
        patient: Option<String>,
        /// Number of chunks to retrieve
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..=50))]
        top_k: Option<u16>,
        /// Print the retrieved context before the answer
        #[arg(long)]
        show_context: bool,
    },
    /// Start an interactive conversation with the assistant
    Chat {
        /// Patient name; prompted for when omitted
        #[arg(long)]
        patient: Option<String>,
    },
    /// Manage patient discharge records
    Patient {
        #[command(subcommand)]
        command: PatientCommands,
    },
    /// Show storage, index and model status
    Status,
}

#[derive(Subcommand)]
enum PatientCommands {
    /// Add a discharge record
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: Option<u32>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        diagnosis: Option<String>,
        /// Discharge date as YYYY-MM-DD
        #[arg(long)]
        discharge_date: Option<NaiveDate>,
        /// Current medication, repeatable
        #[arg(long = "medication")]
        medications: Vec<String>,
        /// Recent symptom, repeatable
        #[arg(long = "symptom")]
        symptoms: Vec<String>,
    },
    /// Show the record for a patient
    Show {
        /// Patient name, matched case-insensitively
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest { path } => {
            ingest(path).await?;
        }
        Commands::Index { rebuild } => {
            index(rebuild).await?;
        }
        Commands::Ask {
            query,
            patient,
            top_k,
            show_context,
        } => {
            ask(query, patient, top_k.map(usize::from), show_context).await?;
        }
        Commands::Chat { patient } => {
            chat(patient).await?;
        }
        Commands::Patient { command } => match command {
            PatientCommands::Add {
                name,
                age,
                gender,
                diagnosis,
                discharge_date,
                medications,
                symptoms,
            } => {
                patient_add(NewPatient {
                    name,
                    age,
                    gender,
                    diagnosis,
                    discharge_date,
                    medications,
                    symptoms,
                })?;
            }
            PatientCommands::Show { name } => {
                patient_show(&name)?;
            }
        },
        Commands::Status => {
            show_status()?;
        }
    }

    Ok(())
}
