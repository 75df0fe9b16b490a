//! Embedding generation for single items (write path) and for queries.

use std::time::Instant;

use tracing::debug;

use crate::embedder::{EmbedPurpose, EmbeddingClient};
use crate::error::{EmbeddingError, GenerateError};
use crate::item::SearchableItem;
use crate::store::EmbeddingStore;

/// Turns items and queries into vectors through the active provider.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    client: EmbeddingClient,
}

impl EmbeddingGenerator {
    /// Wraps a configured client.
    pub fn new(client: EmbeddingClient) -> Self {
        Self { client }
    }

    /// Vector length every stored embedding must have.
    pub fn dimensions(&self) -> usize {
        self.client.dimensions()
    }

    /// Name of the active provider.
    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    /// Computes the document vector for `item` without touching it.
    pub async fn embed_item(&self, item: &SearchableItem) -> Result<Vec<f32>, EmbeddingError> {
        self.client
            .embed(&item.text_for_embedding(), EmbedPurpose::Document)
            .await
    }

    /// Computes a query vector.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.client.embed(query, EmbedPurpose::Query).await
    }

    /// Sets `item.embedding` on success; on failure the previous embedding stays.
    pub async fn generate_for(&self, item: &mut SearchableItem) -> Result<(), EmbeddingError> {
        let vector = self.embed_item(item).await?;
        item.embedding = Some(vector);
        Ok(())
    }

    /// Embeds `item` and persists the vector before returning.
    ///
    /// Runs inline with the content write, so the write pays one provider round
    /// trip. The item is only updated once the store accepted the vector.
    pub async fn generate_and_store<S>(
        &self,
        item: &mut SearchableItem,
        store: &S,
    ) -> Result<(), GenerateError>
    where
        S: EmbeddingStore + ?Sized,
    {
        let started = Instant::now();
        let vector = self.embed_item(item).await?;
        store.store_embedding(&item.key(), &vector).await?;
        item.embedding = Some(vector);
        debug!(
            item = %item.key(),
            provider = self.provider_name(),
            duration_ms = started.elapsed().as_millis() as u64,
            "item embedding stored"
        );
        Ok(())
    }
}
