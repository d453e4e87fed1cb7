
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, EmbeddingConfig, EmbeddingProvider, LlmConfig};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Discharge Assistant Configuration").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Embedding Configuration").bold().yellow());
    eprintln!("Choose how document chunks and questions are turned into vectors.");
    eprintln!();

    configure_embedding(&mut config.embedding)?;

    if config.embedding.provider == EmbeddingProvider::Ollama {
        eprintln!();
        eprintln!("{}", style("Testing embedding server...").yellow());

        if test_ollama_connection(&config.embedding) {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before ingesting.");
        }
    }

    eprintln!();
    eprintln!("{}", style("Language Model Configuration").bold().yellow());
    eprintln!("Any OpenAI-compatible chat completions endpoint can be used.");
    eprintln!();

    configure_llm(&mut config.llm)?;

    eprintln!();
    eprintln!("{}", style("Retrieval Configuration").bold().yellow());
    configure_retrieval(&mut config)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    match config.embedding.provider {
        EmbeddingProvider::Ollama => {
            eprintln!("  Provider: {}", style("ollama").cyan());
            match config.ollama_url() {
                Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
                Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
            }
            eprintln!("  Model: {}", style(&config.embedding.model).cyan());
            eprintln!(
                "  Batch Size: {}",
                style(config.embedding.batch_size).cyan()
            );
        }
        EmbeddingProvider::Hashing => {
            eprintln!("  Provider: {}", style("hashing").cyan());
            eprintln!(
                "  Dimension: {}",
                style(config.embedding.dimension).cyan()
            );
        }
    }

    eprintln!();
    eprintln!("{}", style("Language Model Settings:").bold().yellow());
    match config.llm.chat_completions_url() {
        Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
        Err(e) => eprintln!("  Endpoint: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.llm.model).cyan());
    let token_state = if config.llm.token().is_some() {
        style("set").green()
    } else {
        style("not set").red()
    };
    eprintln!("  Token: ${} ({})", config.llm.token_env, token_state);
    eprintln!("  Max Tokens: {}", style(config.llm.max_tokens).cyan());
    eprintln!("  Timeout: {}s", style(config.llm.timeout_secs).cyan());

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!(
        "  Chunk Size: {}",
        style(config.chunking.chunk_size).cyan()
    );
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!("Data directory: {}", style(config.data_dir().display()).dim());

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    let base_dir = Config::default_base_dir().context("Failed to resolve config directory")?;

    Config::load(&base_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("Existing configuration could not be read. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: base_dir.clone(),
                ..Config::default()
            })
        },
        |config| {
            if config.config_file_path().exists() {
                eprintln!("{}", style("Found existing configuration.").green());
            } else {
                eprintln!(
                    "{}",
                    style("No existing configuration found. Using defaults.").yellow()
                );
            }
            Ok(config)
        },
    )
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let providers = &["ollama", "hashing (offline)"];
    let default_index = match embedding.provider {
        EmbeddingProvider::Ollama => 0,
        EmbeddingProvider::Hashing => 1,
    };

    let provider_index = Select::new()
        .with_prompt("Embedding provider")
        .default(default_index)
        .items(providers)
        .interact()?;

    if provider_index == 1 {
        let dimension: u32 = Input::new()
            .with_prompt("Vector dimension")
            .default(embedding.dimension)
            .validate_with(|input: &u32| -> Result<(), &str> {
                if (16..=4096).contains(input) {
                    Ok(())
                } else {
                    Err("Dimension must be between 16 and 4096")
                }
            })
            .interact_text()?;

        embedding.provider = EmbeddingProvider::Hashing;
        embedding.set_dimension(dimension)?;
        return Ok(());
    }

    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == embedding.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(embedding.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = EmbeddingConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..EmbeddingConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(embedding.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(embedding.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embedding.provider = EmbeddingProvider::Ollama;
    embedding.set_protocol(protocol)?;
    embedding.set_host(host)?;
    embedding.set_port(port)?;
    embedding.set_model(model)?;
    embedding.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_llm(llm: &mut LlmConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("Chat completions base URL")
        .default(llm.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            LlmConfig {
                base_url: input.clone(),
                ..LlmConfig::default()
            }
            .chat_completions_url()
            .map(|_| ())
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Language model")
        .default(llm.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let token_env: String = Input::new()
        .with_prompt("Environment variable holding the API token")
        .default(llm.token_env.clone())
        .interact_text()?;

    let max_tokens: u32 = Input::new()
        .with_prompt("Maximum answer tokens")
        .default(llm.max_tokens)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (1..=4096).contains(input) {
                Ok(())
            } else {
                Err("Max tokens must be between 1 and 4096")
            }
        })
        .interact_text()?;

    llm.set_base_url(base_url)?;
    llm.set_model(model)?;
    llm.set_max_tokens(max_tokens)?;

    let updated = LlmConfig {
        token_env,
        ..llm.clone()
    };
    updated.validate()?;
    *llm = updated;

    Ok(())
}

fn configure_retrieval(config: &mut Config) -> Result<()> {
    let chunk_size: usize = Input::new()
        .with_prompt("Chunk size (characters)")
        .default(config.chunking.chunk_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (100..=8000).contains(input) {
                Ok(())
            } else {
                Err("Chunk size must be between 100 and 8000")
            }
        })
        .interact_text()?;

    let top_k: usize = Input::new()
        .with_prompt("Chunks retrieved per question")
        .default(config.retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=50).contains(input) {
                Ok(())
            } else {
                Err("Top-k must be between 1 and 50")
            }
        })
        .interact_text()?;

    config.chunking.chunk_size = chunk_size;
    config.retrieval.top_k = top_k;
    config.validate()?;

    Ok(())
}

fn test_ollama_connection(embedding: &EmbeddingConfig) -> bool {
    let Ok(base_url) = embedding.ollama_url() else {
        return false;
    };
    let Ok(url) = base_url.join("/api/version") else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(url.as_str()).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) => (400..500).contains(&code),
        Err(_) => false,
    }
}
