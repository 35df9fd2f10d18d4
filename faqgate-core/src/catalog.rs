//! Resolution of topic partitions and corpora to concrete collections.
//!
//! Each partition may live on its own vector store deployment, so a `Collection`
//! carries the store handle alongside the collection name.

use crate::config::{CollectionConfig, FaqgateConfig};
use crate::credentials::CredentialStore;
use crate::error::{ConfigError, PipelineError};
use crate::secret_ref::SecretResolver;
use crate::vector_store::{QdrantStore, VectorStore};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Default payload path of a curated answer (LangChain `metadata` layout).
pub const DEFAULT_ANSWER_PATH: &str = "metadata.answer";

/// Default payload key of a document passage.
pub const DEFAULT_CONTENT_PATH: &str = "page_content";

/// Where to find the text and source id inside a point payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSchema {
    pub text_path: String,
    /// `None` means the point id is the source id.
    pub source_path: Option<String>,
}

impl PayloadSchema {
    pub fn faq() -> Self {
        Self {
            text_path: DEFAULT_ANSWER_PATH.into(),
            source_path: None,
        }
    }

    pub fn corpus() -> Self {
        Self {
            text_path: DEFAULT_CONTENT_PATH.into(),
            source_path: None,
        }
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// The text at `text_path`, or `None` when missing or not a string.
    pub fn text<'a>(&self, payload: &'a Value) -> Option<&'a str> {
        lookup_path(payload, &self.text_path).and_then(Value::as_str)
    }

    /// The source id at `source_path`, falling back to `point_id`.
    pub fn source_id(&self, payload: &Value, point_id: &str) -> String {
        self.source_path
            .as_deref()
            .and_then(|path| lookup_path(payload, path))
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| point_id.to_string())
    }
}

/// Walk a dotted path (`metadata.answer`) through nested JSON objects.
pub fn lookup_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(payload, |value, segment| value.get(segment))
}

/// A searchable collection on a specific store.
#[derive(Clone)]
pub struct Collection {
    pub name: String,
    pub store: Arc<dyn VectorStore>,
    pub schema: PayloadSchema,
}

impl Collection {
    pub fn new(name: impl Into<String>, store: Arc<dyn VectorStore>, schema: PayloadSchema) -> Self {
        Self {
            name: name.into(),
            store,
            schema,
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("store", &self.store.endpoint())
            .field("schema", &self.schema)
            .finish()
    }
}

/// Registry of topic partitions (curated FAQ collections) and corpora (document
/// collections).
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    partitions: BTreeMap<String, Collection>,
    corpora: BTreeMap<String, Collection>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition(mut self, id: impl Into<String>, collection: Collection) -> Self {
        self.partitions.insert(id.into(), collection);
        self
    }

    pub fn with_corpus(mut self, id: impl Into<String>, collection: Collection) -> Self {
        self.corpora.insert(id.into(), collection);
        self
    }

    /// Resolve a partition id. Surrounding whitespace is ignored; matching is
    /// case-sensitive.
    pub fn resolve_partition(&self, id: &str) -> Result<&Collection, PipelineError> {
        self.partitions
            .get(id.trim())
            .ok_or_else(|| PipelineError::UnknownPartition {
                partition: id.to_string(),
                known: self.partition_ids(),
            })
    }

    pub fn resolve_corpus(&self, id: &str) -> Result<&Collection, PipelineError> {
        self.corpora
            .get(id.trim())
            .ok_or_else(|| PipelineError::UnknownCorpus {
                corpus: id.to_string(),
                known: self.corpus_ids(),
            })
    }

    pub fn partition_ids(&self) -> Vec<String> {
        self.partitions.keys().cloned().collect()
    }

    pub fn corpus_ids(&self) -> Vec<String> {
        self.corpora.keys().cloned().collect()
    }

    /// Build the catalog from configuration, connecting one `QdrantStore` per
    /// configured store and sharing it between the collections that use it.
    pub fn from_config(
        config: &FaqgateConfig,
        cred_store: &dyn CredentialStore,
    ) -> Result<Self, ConfigError> {
        let mut stores: HashMap<&str, Arc<dyn VectorStore>> = HashMap::new();
        for (name, store) in &config.stores {
            let api_key = SecretResolver::resolve_optional(&store.api_key, cred_store).map_err(
                |e| ConfigError::Secret {
                    field: format!("stores.{name}.api_key"),
                    source: e,
                },
            )?;
            let client = QdrantStore::new(&store.url, api_key, store.timeout_secs)?;
            stores.insert(name.as_str(), Arc::new(client));
        }

        let build = |role: &str, id: &str, c: &CollectionConfig, default: PayloadSchema| {
            let store = stores
                .get(c.store.as_str())
                .cloned()
                .ok_or_else(|| ConfigError::UnknownStore {
                    store: c.store.clone(),
                    referenced_by: format!("{role}.{id}"),
                })?;
            let schema = PayloadSchema {
                text_path: c.text_path.clone().unwrap_or(default.text_path),
                source_path: c.source_path.clone(),
            };
            Ok::<_, ConfigError>(Collection::new(c.collection.clone(), store, schema))
        };

        let mut catalog = Catalog::new();
        for (id, c) in &config.partitions {
            let collection = build("partitions", id.as_str(), c, PayloadSchema::faq())?;
            catalog.partitions.insert(id.clone(), collection);
        }
        for (id, c) in &config.corpora {
            let collection = build("corpora", id.as_str(), c, PayloadSchema::corpus())?;
            catalog.corpora.insert(id.clone(), collection);
        }
        Ok(catalog)
    }
}
