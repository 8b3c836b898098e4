//! Builds the runtime collaborators from configuration.

use lysai_config::AppConfig;
use lysai_core::{Embedder, EpisodeStore, SimilarityIndex};
use lysai_memory::{
    HashingEmbedder, InMemoryEpisodeStore, NoopIndex, ProviderEmbedder, SemanticIndex,
    SqliteEpisodeStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// The two memory tiers, opened on the configured database.
pub struct Memory {
    pub db_path: PathBuf,
    pub store: Arc<SqliteEpisodeStore>,
    /// `None` when `memory.index = "none"`
    pub semantic: Option<Arc<SemanticIndex>>,
}

impl Memory {
    pub async fn open(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_path = config.memory.resolved_db_path();
        let store = open_store(&db_path).await?;

        let semantic = match config.memory.index.as_str() {
            "none" => None,
            _ => Some(Arc::new(
                SemanticIndex::sqlite(store.clone(), embedder(config)).await?,
            )),
        };

        Ok(Self {
            db_path,
            store,
            semantic,
        })
    }
}

async fn open_store(db_path: &Path) -> Result<Arc<SqliteEpisodeStore>, Box<dyn std::error::Error>> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(
        SqliteEpisodeStore::new(&db_path.to_string_lossy()).await?,
    ))
}

/// Store and index for a pipeline run.
///
/// Memory problems never stop a run: an unopenable database falls back to
/// an in-process store, an unopenable index to [`NoopIndex`].
pub async fn pipeline_memory(config: &AppConfig) -> (Arc<dyn EpisodeStore>, Arc<dyn SimilarityIndex>) {
    let db_path = config.memory.resolved_db_path();
    let disabled = config.memory.index == "none";

    let store = match open_store(&db_path).await {
        Ok(store) => store,
        Err(e) => {
            warn!(path = %db_path.display(), error = %e, "Episode store unavailable, using in-memory store");
            let store: Arc<dyn EpisodeStore> = Arc::new(InMemoryEpisodeStore::new());
            let index: Arc<dyn SimilarityIndex> = if disabled {
                Arc::new(NoopIndex)
            } else {
                Arc::new(SemanticIndex::in_memory(store.clone(), embedder(config)))
            };
            return (store, index);
        }
    };

    let index: Arc<dyn SimilarityIndex> = if disabled {
        Arc::new(NoopIndex)
    } else {
        match SemanticIndex::sqlite(store.clone(), embedder(config)).await {
            Ok(index) => Arc::new(index),
            Err(e) => {
                warn!(error = %e, "Similarity index unavailable, continuing without it");
                Arc::new(NoopIndex)
            }
        }
    };

    let store: Arc<dyn EpisodeStore> = store;
    (store, index)
}

pub fn embedder(config: &AppConfig) -> Arc<dyn Embedder> {
    match config.memory.embedder.as_str() {
        "provider" => Arc::new(ProviderEmbedder::new(
            lysai_providers::build_provider(&config.oracle.primary),
            config.memory.embedding_model.clone(),
        )),
        _ => Arc::new(HashingEmbedder::new(config.memory.dimensions)),
    }
}

/// Load the configuration or explain why it could not be loaded.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_db(path: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.memory.db_path = Some(path.display().to_string());
        config
    }

    #[tokio::test]
    async fn unopenable_database_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let config = config_with_db(&blocker.join("memory.db"));
        assert!(Memory::open(&config).await.is_err());

        let (store, index) = pipeline_memory(&config).await;
        let id = store.log_episode("How many customers?", &[], None).await.unwrap();
        assert!(store.get_episode(id).await.unwrap().is_some());

        index.add(id, "How many customers?", Some("599 customers")).await;
        let hits = index.search_similar_questions("How many customers?", 3).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].episode_id, id);
    }

    #[tokio::test]
    async fn healthy_database_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("memory.db");

        let (store, _index) = pipeline_memory(&config_with_db(&db)).await;
        store.log_episode("Top films", &[], None).await.unwrap();
        assert!(db.exists());
    }
}
