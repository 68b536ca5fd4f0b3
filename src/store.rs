//! In-memory document store and the corpus that pairs it with the index.
//!
//! [`DocumentStore`] owns documents and their chunks; [`Corpus`] couples a
//! store with a [`VectorIndex`] and keeps the two in lockstep: every
//! mutation updates both inside the same call, so a reader holding the
//! corpus lock never observes a chunk in one structure but not the other.
//! When the document cap is exceeded, the oldest document by ingestion
//! sequence is evicted together with all of its chunks.

use std::collections::HashMap;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EmbeddingError;
use crate::index::VectorIndex;
use crate::models::{Chunk, Document};

#[derive(Default)]
pub struct DocumentStore {
    documents: HashMap<Uuid, Document>,
    chunks: HashMap<Uuid, Chunk>,
    /// document id → its chunk ids, in document order.
    doc_chunks: HashMap<Uuid, Vec<Uuid>>,
    next_seq: u64,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn document(&self, id: &Uuid) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn chunk(&self, id: &Uuid) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn chunk_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.chunks.keys()
    }

    /// Next value of the monotonic ingestion counter.
    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Id of the oldest document by ingestion sequence.
    fn oldest(&self) -> Option<Uuid> {
        self.documents
            .values()
            .min_by_key(|d| d.seq)
            .map(|d| d.id)
    }

    fn insert(&mut self, mut document: Document, chunks: Vec<Chunk>) {
        document.seq = self.take_seq();
        let chunk_ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
        for chunk in chunks {
            self.chunks.insert(chunk.id, chunk);
        }
        self.doc_chunks.insert(document.id, chunk_ids);
        self.documents.insert(document.id, document);
    }

    /// Remove a document and return its chunk ids; `None` if absent.
    fn remove(&mut self, document_id: &Uuid) -> Option<Vec<Uuid>> {
        self.documents.remove(document_id)?;
        let chunk_ids = self.doc_chunks.remove(document_id).unwrap_or_default();
        for id in &chunk_ids {
            self.chunks.remove(id);
        }
        Some(chunk_ids)
    }
}

/// Store plus index, mutated only through methods that keep both in sync.
pub struct Corpus {
    store: DocumentStore,
    index: VectorIndex,
    max_documents: usize,
}

impl Corpus {
    pub fn new(dims: usize, max_documents: usize) -> Self {
        Self {
            store: DocumentStore::new(),
            index: VectorIndex::new(dims),
            max_documents: max_documents.max(1),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn document_count(&self) -> usize {
        self.store.document_count()
    }

    pub fn chunk_count(&self) -> usize {
        self.store.chunk_count()
    }

    /// Insert an embedded document with its chunks, evicting the oldest
    /// documents while the cap is exceeded. Returns the evicted ids.
    ///
    /// Every chunk must carry an embedding of the index dimensionality.
    pub fn insert_document(
        &mut self,
        document: Document,
        chunks: Vec<Chunk>,
    ) -> Result<Vec<Uuid>, EmbeddingError> {
        for chunk in &chunks {
            self.index.add(chunk.id, chunk.embedding.clone())?;
        }
        let doc_id = document.id;
        let title = document.title.clone();
        self.store.insert(document, chunks);
        debug!(document = %doc_id, title = %title, "document inserted");

        let mut evicted = Vec::new();
        while self.store.document_count() > self.max_documents {
            // The new document has the highest seq, so the oldest is
            // never the one just inserted.
            let Some(oldest) = self.store.oldest() else {
                break;
            };
            self.remove_document(&oldest);
            info!(document = %oldest, "evicted oldest document over cap");
            evicted.push(oldest);
        }
        Ok(evicted)
    }

    /// Remove a document and all its chunks. Idempotent: removing an
    /// unknown id changes nothing and returns `false`.
    pub fn remove_document(&mut self, document_id: &Uuid) -> bool {
        match self.store.remove(document_id) {
            Some(chunk_ids) => {
                for chunk_id in &chunk_ids {
                    self.index.remove(chunk_id);
                }
                true
            }
            None => false,
        }
    }

    /// Search the index, resolving hits to their chunk and document.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(Chunk, Document, f32)> {
        self.index
            .search(query, k)
            .into_iter()
            .filter_map(|(chunk_id, score)| {
                let chunk = self.store.chunk(&chunk_id)?;
                let document = self.store.document(&chunk.document_id)?;
                Some((chunk.clone(), document.clone(), score))
            })
            .collect()
    }

    /// True when the index's live ids match the store's chunk ids exactly.
    pub fn verify_integrity(&self) -> bool {
        self.index.matches_ids(self.store.chunk_ids())
    }

    /// Rebuild the index from the stored chunk embeddings.
    pub fn repair(&mut self) -> Result<(), EmbeddingError> {
        let entries: Vec<(Uuid, Vec<f32>)> = self
            .store
            .chunks
            .values()
            .map(|c| (c.id, c.embedding.clone()))
            .collect();
        self.index.rebuild(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentFormat;
    use chrono::Utc;
    use std::path::PathBuf;

    fn doc(title: &str) -> Document {
        Document {
            id: Uuid::new_v4(),
            source_path: PathBuf::from(format!("{title}.txt")),
            format: DocumentFormat::Txt,
            raw_text: String::new(),
            title: title.to_string(),
            ingested_at: Utc::now(),
            seq: 0,
        }
    }

    fn chunk_for(document_id: Uuid, hot: usize, dims: usize) -> Chunk {
        let mut embedding = vec![0.0; dims];
        embedding[hot % dims] = 1.0;
        Chunk {
            id: Uuid::new_v4(),
            document_id,
            text: format!("chunk {hot}"),
            start_offset: 0,
            end_offset: 7,
            embedding,
        }
    }

    #[test]
    fn eviction_removes_oldest_and_its_chunks() {
        let mut corpus = Corpus::new(4, 2);
        let mut doc_ids = Vec::new();
        for i in 0..3 {
            let d = doc(&format!("doc{i}"));
            doc_ids.push(d.id);
            let chunks = vec![chunk_for(d.id, i, 4), chunk_for(d.id, i + 1, 4)];
            let evicted = corpus.insert_document(d, chunks).unwrap();
            if i < 2 {
                assert!(evicted.is_empty());
            } else {
                assert_eq!(evicted, vec![doc_ids[0]]);
            }
        }

        assert_eq!(corpus.document_count(), 2);
        assert_eq!(corpus.chunk_count(), 4);
        assert!(corpus.store().document(&doc_ids[0]).is_none());
        assert!(corpus.verify_integrity());
    }

    #[test]
    fn evicted_chunks_never_surface_in_search() {
        let mut corpus = Corpus::new(4, 1);
        let d1 = doc("first");
        let d1_id = d1.id;
        corpus
            .insert_document(d1, vec![chunk_for(d1_id, 0, 4)])
            .unwrap();

        let d2 = doc("second");
        let d2_id = d2.id;
        corpus
            .insert_document(d2, vec![chunk_for(d2_id, 0, 4)])
            .unwrap();

        let hits = corpus.search(&[1.0, 0.0, 0.0, 0.0], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.id, d2_id);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut corpus = Corpus::new(4, 10);
        let d = doc("doc");
        let id = d.id;
        corpus.insert_document(d, vec![chunk_for(id, 0, 4)]).unwrap();

        assert!(corpus.remove_document(&id));
        assert!(!corpus.remove_document(&id));
        assert_eq!(corpus.document_count(), 0);
        assert_eq!(corpus.chunk_count(), 0);
        assert!(corpus.verify_integrity());
    }

    #[test]
    fn document_and_chunk_counts_stay_in_step() {
        let mut corpus = Corpus::new(4, 10);
        for i in 0..4 {
            let d = doc(&format!("doc{i}"));
            let id = d.id;
            corpus
                .insert_document(d, vec![chunk_for(id, i, 4), chunk_for(id, i + 1, 4)])
                .unwrap();
        }
        assert_eq!(corpus.document_count(), 4);
        assert_eq!(corpus.chunk_count(), 8);
        assert!(corpus.verify_integrity());
    }

    #[test]
    fn repair_restores_integrity_from_embeddings() {
        let mut corpus = Corpus::new(4, 10);
        let d = doc("doc");
        let id = d.id;
        corpus
            .insert_document(d, vec![chunk_for(id, 0, 4), chunk_for(id, 1, 4)])
            .unwrap();

        corpus.repair().unwrap();
        assert!(corpus.verify_integrity());
        let hits = corpus.search(&[1.0, 0.0, 0.0, 0.0], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.id, id);
    }
}
