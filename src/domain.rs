use crate::errors::{IntegrationError, RepoError, StorageError};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{marker::PhantomData, sync::Arc};

/// Operations on a schemaless document database. Documents are JSON objects
/// addressed by `(collection, id)`.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Retrieves a document. Returns Ok(None) if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RepoError>;

    /// Creates or replaces a document.
    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), RepoError>;

    /// Creates a document only if no document with this id exists.
    /// Fails with `RepoError::Conflict` otherwise; the check and the write are one atomic step.
    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<(), RepoError>;

    /// Deletes a document. Returns whether something was deleted.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, RepoError>;

    /// Lists every document of a collection.
    /// WARNING: This reads the whole collection.
    async fn scan(&self, collection: &str) -> Result<Vec<Value>, RepoError>;
}

/// An object stored in a file.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Trait defining operations for storing and retrieving file data (meme images, media).
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Uploads file data to the storage backend.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError>;

    /// Downloads file data and its content type.
    async fn download(&self, key: &str) -> Result<StoredObject, StorageError>;

    /// Deletes a file. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Picture produced from a text prompt.
#[derive(Debug, Clone)]
pub struct GeneratedAsset {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync + 'static {
    async fn generate(&self, prompt: &str) -> Result<GeneratedAsset, IntegrationError>;
}

#[async_trait]
pub trait Thumbnailer: Send + Sync + 'static {
    /// Renders a PNG still from a video file.
    async fn thumbnail(&self, video: &[u8], extension: &str) -> Result<Vec<u8>, IntegrationError>;
}

/// A type stored as one document of a fixed collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> String;
}

/// Typed view of one collection of a `DocumentStore`.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, _marker: PhantomData }
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>, RepoError> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(value) => decode(value).map(Some),
            None => Ok(None),
        }
    }

    /// Creates the document, failing with a conflict if its id is taken.
    pub async fn insert(&self, doc: &T) -> Result<(), RepoError> {
        self.store.insert(T::COLLECTION, &doc.id(), encode(doc)?).await
    }

    /// Creates or replaces the document.
    pub async fn save(&self, doc: &T) -> Result<(), RepoError> {
        self.store.put(T::COLLECTION, &doc.id(), encode(doc)?).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, RepoError> {
        self.store.delete(T::COLLECTION, id).await
    }

    pub async fn list(&self) -> Result<Vec<T>, RepoError> {
        self.store
            .scan(T::COLLECTION)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Lists the documents matching `predicate`.
    pub async fn filter<F>(&self, predicate: F) -> Result<Vec<T>, RepoError>
    where
        F: Fn(&T) -> bool,
    {
        Ok(self.list().await?.into_iter().filter(|doc| predicate(doc)).collect())
    }
}

fn encode<T: Document>(doc: &T) -> Result<Value, RepoError> {
    serde_json::to_value(doc).map_err(|e| RepoError::DataCorruption {
        collection: T::COLLECTION.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: Document>(value: Value) -> Result<T, RepoError> {
    serde_json::from_value(value).map_err(|e| {
        tracing::error!(collection = T::COLLECTION, error = %e, "Failed to decode stored document");
        RepoError::DataCorruption {
            collection: T::COLLECTION.to_string(),
            reason: e.to_string(),
        }
    })
}
