use super::*;
use crate::embeddings::chunking::ChunkingConfig;
use std::fs;
use tempfile::TempDir;

mod integration_tests {
    use super::*;

    #[test]
    fn load_missing_config_returns_defaults() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");

        let config = Config::load(temp_dir.path()).expect("should load defaults");

        assert_eq!(config, Config::with_base_dir(temp_dir.path()));
        assert_eq!(config.get_base_dir(), temp_dir.path());
    }

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_dir = temp_dir.path().join(".chatpdf");

        let mut original_config = Config::with_base_dir(&config_dir);
        original_config.ollama.host = "test-host".to_string();
        original_config.ollama.port = 8080;
        original_config.chunking.max_chunk_size = 512;
        original_config.chunking.overlap = 64;

        original_config.save().expect("should save config");
        assert!(config_dir.join("config.toml").exists());

        let loaded_config = Config::load(&config_dir).expect("should load saved config");
        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn save_rejects_invalid_config() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let mut config = Config::with_base_dir(temp_dir.path());
        config.chunking.overlap = 2048;

        assert!(config.save().is_err());
        assert!(!temp_dir.path().join("config.toml").exists());
    }

    #[test]
    fn invalid_toml_handling() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::write(
            temp_dir.path().join("config.toml"),
            "[ollama\nhost = \"localhost\"\n",
        )
        .expect("should write config file");

        assert!(Config::load(temp_dir.path()).is_err());
    }

    #[test]
    fn load_rejects_out_of_range_values() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::write(
            temp_dir.path().join("config.toml"),
            "[retrieval]\ntop_k = 0\n",
        )
        .expect("should write config file");

        assert!(Config::load(temp_dir.path()).is_err());
    }

    #[test]
    fn partial_config_with_defaults() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::write(
            temp_dir.path().join("config.toml"),
            r#"
            [ollama]
            host = "custom-host"

            [retrieval]
            similarity_threshold = 0.7

            [prompt]
            locale = "de"
            "#,
        )
        .expect("should write config file");

        let config = Config::load(temp_dir.path()).expect("partial config should load");

        assert_eq!(config.ollama.host, "custom-host");
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.retrieval.top_k, 3);
        assert!((config.retrieval.similarity_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.chunking, ChunkingConfig::default());
        let template = config.prompt_template().expect("built-in template");
        assert!(template.as_str().contains("Sie sind ein Assistent"));
    }

    #[test]
    fn get_config_dir_is_under_home() {
        if let Ok(dir) = get_config_dir() {
            assert!(dir.ends_with(".chatpdf") || dir.ends_with("chatpdf"));
        }
    }
}
