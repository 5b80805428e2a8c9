use figment::Jail;
use ragdesk_core::config::{Config, MissingIndexPolicy};

#[test]
fn files_and_env_override_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            [chunking]
            chunk_size = 300
            overlap = 60

            [index]
            path = "data/papers.index"
            on_missing = "error"
            "#,
        )?;
        jail.create_file("config.test.toml", "[retrieval]\ntop_k = 8\n")?;
        jail.set_env("APP_EMBEDDING__USE_FAKE", "true");
        jail.set_env("APP_INGEST__MAX_DOCUMENTS", "3");

        let settings = Config::load_for_env("test")
            .and_then(|c| c.settings())
            .map_err(|e| e.to_string())?;

        assert_eq!(settings.chunking.chunk_size, 300);
        assert_eq!(settings.chunking.overlap, 60);
        assert_eq!(settings.retrieval.top_k, 8);
        assert_eq!(settings.ingest.max_documents, 3);
        assert!(settings.embedding.use_fake);
        assert_eq!(settings.embedding.dimension, 384);
        assert_eq!(settings.index.path, "data/papers.index");
        assert_eq!(settings.index.on_missing, MissingIndexPolicy::Error);
        Ok(())
    });
}

#[test]
fn overlap_not_below_chunk_size_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[chunking]\nchunk_size = 50\noverlap = 50\n")?;
        let result = Config::load_for_env("dev").and_then(|c| c.settings());
        assert!(result.is_err());
        Ok(())
    });
}

#[test]
fn get_reads_single_keys() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[retrieval]\ntop_k = 2\n")?;
        let config = Config::load_for_env("prod").map_err(|e| e.to_string())?;
        let top_k: usize = config.get("retrieval.top_k").map_err(|e| e.to_string())?;
        assert_eq!(top_k, 2);
        assert!(config.get::<usize>("retrieval.nope").is_err());
        Ok(())
    });
}
