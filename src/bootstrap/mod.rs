//! Bootstrap system for DocBuddy
//!
//! Assembles the process-wide components from configuration: the model
//! client, the embedder, the corpus store with its documents loaded, and
//! the step table handed to the orchestrator. Also checks that Ollama is
//! reachable and has the models the configuration names.

use std::sync::Arc;

use tracing::{info, warn};

use crate::agent::{Orchestrator, WorkflowConfig};
use crate::cli::{Config, CorpusBackend, StepMode};
use crate::errors::{DocError, Result};
use crate::models::{ModelClient, OllamaClient};
use crate::rag::{
    Chunker, Embedder, HashingEmbedder, InMemoryCorpus, OllamaEmbedder, QdrantCorpus, Retriever,
    SourceDocument,
};
use crate::steps::{
    ClausePlanner, ExtractiveSynthesizer, ModelPlanner, ModelSynthesizer, RetrievalResearcher,
    ScoreCritic, StepSet,
};
use crate::types::Chunk;

/// Bootstrap check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStatus {
    Ready,
    OllamaNotRunning,
    ModelNotAvailable(String),
}

/// Check Ollama and the configured models
pub async fn check_ollama(client: &OllamaClient, config: &Config) -> Result<BootstrapStatus> {
    if !client.health_check().await? {
        return Ok(BootstrapStatus::OllamaNotRunning);
    }

    let available = client.list_models().await?;
    let mut wanted = vec![config.ollama.model.as_str()];
    if !config.ollama.embedding_model.is_empty() {
        wanted.push(config.ollama.embedding_model.as_str());
    }

    for model in wanted {
        if !has_model(&available, model) {
            return Ok(BootstrapStatus::ModelNotAvailable(model.to_string()));
        }
    }

    Ok(BootstrapStatus::Ready)
}

/// Model tags match with or without the implicit `:latest`
fn has_model(available: &[String], wanted: &str) -> bool {
    available.iter().any(|name| {
        name == wanted
            || name.strip_suffix(":latest") == Some(wanted)
            || wanted.strip_suffix(":latest") == Some(name.as_str())
    })
}

/// Embedder named by the configuration
///
/// An empty `embedding_model` selects offline hashing embeddings.
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    if config.ollama.embedding_model.is_empty() {
        return Ok(Arc::new(HashingEmbedder::new(config.corpus.embedding_dim)));
    }

    Ok(Arc::new(OllamaEmbedder::new(
        &config.ollama_url(),
        &config.ollama.embedding_model,
        config.ollama_timeout(),
    )?))
}

/// The corpus store selected by configuration
pub enum Corpus {
    Memory(Arc<InMemoryCorpus>),
    Qdrant(Arc<QdrantCorpus>),
}

impl Corpus {
    /// Open the configured store
    pub async fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let chunker = Chunker::new(config.chunker_config())?;

        match config.corpus.backend {
            CorpusBackend::Memory => Ok(Corpus::Memory(Arc::new(InMemoryCorpus::new(
                embedder, chunker,
            )))),
            CorpusBackend::Qdrant => {
                // The collection dimension has to match whatever the embedder emits
                let dimension = embedder.embed("dimension probe").await?.len();
                if dimension == 0 {
                    return Err(DocError::Config("embedder returned an empty vector".to_string()));
                }
                let corpus = QdrantCorpus::connect(
                    &config.corpus.qdrant_url,
                    &config.corpus.collection,
                    dimension as u64,
                    embedder,
                    chunker,
                )
                .await?;
                Ok(Corpus::Qdrant(Arc::new(corpus)))
            }
        }
    }

    /// Chunk, embed and store documents, returning the chunk count
    pub async fn ingest(&self, documents: &[SourceDocument]) -> Result<usize> {
        let mut total = 0;
        for document in documents {
            let chunks = self.add(document).await?;
            if chunks.is_empty() {
                warn!(source = %document.source, "Document produced no chunks");
            }
            total += chunks.len();
        }
        info!(documents = documents.len(), chunks = total, "Corpus ingested");
        Ok(total)
    }

    async fn add(&self, document: &SourceDocument) -> Result<Vec<Chunk>> {
        match self {
            Corpus::Memory(store) => {
                store
                    .add_document_from(&document.id, &document.source, &document.text)
                    .await
            }
            Corpus::Qdrant(store) => {
                store
                    .add_document_from(&document.id, &document.source, &document.text)
                    .await
            }
        }
    }

    /// Read side handed to the researcher
    pub fn retriever(&self) -> Arc<dyn Retriever> {
        match self {
            Corpus::Memory(store) => store.clone() as Arc<dyn Retriever>,
            Corpus::Qdrant(store) => store.clone() as Arc<dyn Retriever>,
        }
    }
}

/// Step table for the chosen mode
///
/// Model mode needs a model client; offline mode ignores it.
pub fn build_steps(
    config: &WorkflowConfig,
    mode: StepMode,
    client: Option<Arc<dyn ModelClient>>,
    retriever: Arc<dyn Retriever>,
) -> Result<StepSet> {
    let researcher = Arc::new(RetrievalResearcher::new(
        retriever,
        crate::rag::SearchParams {
            top_k: config.top_k,
            min_score: config.min_score,
        },
    ));
    let critic = Arc::new(ScoreCritic::new(config.min_supporting_chunks));

    match (mode, client) {
        (StepMode::Model, Some(client)) => Ok(StepSet {
            planner: Arc::new(ModelPlanner::new(client.clone())),
            researcher,
            critic,
            synthesizer: Arc::new(ModelSynthesizer::new(client)),
        }),
        (StepMode::Model, None) => Err(DocError::Config(
            "model mode needs a model client".to_string(),
        )),
        (StepMode::Offline, _) => Ok(StepSet {
            planner: Arc::new(ClausePlanner::new()),
            researcher,
            critic,
            synthesizer: Arc::new(ExtractiveSynthesizer::new()),
        }),
    }
}

/// Everything a front end needs to answer questions
pub struct Assembly {
    pub orchestrator: Arc<Orchestrator>,
    pub corpus: Corpus,
    pub chunks: usize,
}

/// Build the orchestrator over a freshly ingested corpus
pub async fn assemble(
    config: &Config,
    mode: StepMode,
    documents: &[SourceDocument],
) -> Result<Assembly> {
    let embedder = build_embedder(config)?;
    let corpus = Corpus::open(config, embedder).await?;
    let chunks = corpus.ingest(documents).await?;

    let client: Option<Arc<dyn ModelClient>> = match mode {
        StepMode::Model => Some(Arc::new(OllamaClient::with_config(
            &config.ollama_url(),
            &config.ollama.model,
            config.ollama_timeout(),
        )?)),
        StepMode::Offline => None,
    };

    let steps = build_steps(&config.workflow, mode, client, corpus.retriever())?;
    let orchestrator = Arc::new(Orchestrator::new(steps, config.workflow.clone())?);

    Ok(Assembly {
        orchestrator,
        corpus,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Query;

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.ollama.embedding_model = String::new();
        config.workflow.min_score = 0.0;
        config.workflow.critique_threshold = 0.0;
        config.workflow.retry_backoff_ms = 0;
        config
    }

    #[test]
    fn test_has_model_handles_latest_tag() {
        let available = vec!["nomic-embed-text:latest".to_string(), "llama3:8b".to_string()];
        assert!(has_model(&available, "nomic-embed-text"));
        assert!(has_model(&available, "llama3:8b"));
        assert!(!has_model(&available, "llama3"));
    }

    #[test]
    fn test_model_mode_without_client_is_rejected() {
        let corpus = InMemoryCorpus::new(Arc::new(HashingEmbedder::default()), Chunker::default());
        let result = build_steps(
            &WorkflowConfig::default(),
            StepMode::Model,
            None,
            Arc::new(corpus),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_offline_assembly_answers_from_documents() {
        let documents = vec![
            SourceDocument::from_text("retries.md", "# Retries\nmaxRetries defaults to 2"),
            SourceDocument::from_text("logging.md", "# Logging\nLogs go to stderr"),
        ];
        let assembly = assemble(&offline_config(), StepMode::Offline, &documents)
            .await
            .unwrap();
        assert_eq!(assembly.chunks, 2);

        let answer = assembly
            .orchestrator
            .run(Query::new("What does maxRetries default to?"))
            .await
            .unwrap();
        assert!(!answer.citations().is_empty());
        assert!(answer.text().contains("maxRetries"));
    }
}
