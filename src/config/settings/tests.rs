use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.embedding.provider, EmbeddingProvider::Ollama);
    assert_eq!(config.embedding.protocol, "http");
    assert_eq!(config.embedding.host, "localhost");
    assert_eq!(config.embedding.port, 11434);
    assert_eq!(config.embedding.model, "nomic-embed-text:latest");
    assert_eq!(config.embedding.batch_size, 16);
    assert_eq!(config.llm.model, "mistralai/Mistral-7B-Instruct-v0.2");
    assert_eq!(config.llm.max_tokens, 400);
    assert_eq!(config.chunking.chunk_size, 800);
    assert_eq!(config.retrieval.top_k, 3);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.embedding.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.llm.max_tokens = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.llm.base_url = "not a url".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.chunking.chunk_size = 10;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.retrieval.top_k = 0;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn chat_completions_url_appends_path() {
    let mut llm = LlmConfig::default();
    assert_eq!(
        llm.chat_completions_url()
            .expect("default url is valid")
            .as_str(),
        "https://router.huggingface.co/v1/chat/completions"
    );

    llm.base_url = "http://localhost:11434/v1".to_string();
    assert_eq!(
        llm.chat_completions_url()
            .expect("url without trailing slash is valid")
            .as_str(),
        "http://localhost:11434/v1/chat/completions"
    );

    llm.base_url = "ftp://example.com/".to_string();
    assert!(llm.chat_completions_url().is_err());
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let parsed: Config = toml::from_str(
        r#"
            [embedding]
            provider = "hashing"
            dimension = 128

            [retrieval]
            top_k = 5
        "#,
    )
    .expect("partial config should parse");

    assert_eq!(parsed.embedding.provider, EmbeddingProvider::Hashing);
    assert_eq!(parsed.embedding.dimension, 128);
    assert_eq!(parsed.embedding.host, "localhost");
    assert_eq!(parsed.retrieval.top_k, 5);
    assert_eq!(parsed.llm, LlmConfig::default());
}

#[test]
fn setter_validation() {
    let mut embedding = EmbeddingConfig::default();

    assert!(embedding.set_protocol("https".to_string()).is_ok());
    assert!(embedding.set_host("example.com".to_string()).is_ok());
    assert!(embedding.set_port(8080).is_ok());
    assert!(embedding.set_model("new-model".to_string()).is_ok());
    assert!(embedding.set_batch_size(128).is_ok());
    assert!(embedding.set_dimension(256).is_ok());

    assert!(embedding.set_protocol("ftp".to_string()).is_err());
    assert!(embedding.set_port(0).is_err());
    assert!(embedding.set_model(String::new()).is_err());
    assert!(embedding.set_batch_size(0).is_err());
    assert!(embedding.set_dimension(8).is_err());

    let mut llm = LlmConfig::default();
    assert!(llm.set_base_url("http://localhost:8080/v1/".to_string()).is_ok());
    assert!(llm.set_model("local-model".to_string()).is_ok());
    assert!(llm.set_max_tokens(256).is_ok());

    assert!(llm.set_base_url("::".to_string()).is_err());
    assert!(llm.set_model("  ".to_string()).is_err());
    assert!(llm.set_max_tokens(5000).is_err());
}

#[test]
fn load_missing_config_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("missing config should load defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.embedding, EmbeddingConfig::default());
    assert_eq!(config.chunks_path(), temp_dir.path().join("data/chunks.json"));
    assert_eq!(config.index_dir(), temp_dir.path().join("data/index"));
    assert_eq!(
        config.patients_path(),
        temp_dir.path().join("data/patients.json")
    );
}

#[test]
fn save_and_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");
    config.embedding.provider = EmbeddingProvider::Hashing;
    config.llm.max_tokens = 512;

    config.save().expect("should save config");
    let reloaded = Config::load(temp_dir.path()).expect("should reload config");

    assert_eq!(config, reloaded);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[retrieval]\ntop_k = 500\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}
