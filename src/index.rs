//! Approximate-nearest-neighbor index over chunk embeddings.
//!
//! Backed by an HNSW graph (`hnsw_rs`, cosine distance) with an id map and
//! a tombstone set, since HNSW supports no true delete. Search oversamples
//! the graph to absorb tombstones, re-scores candidates with exact cosine
//! similarity over the stored vectors, and falls back to a brute-force scan
//! when the graph returns too few live entries — `search` returns fewer
//! than `k` results only when fewer live entries exist. The graph is
//! rebuilt once tombstones outnumber live entries.

use std::collections::{HashMap, HashSet};

use hnsw_rs::prelude::*;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::EmbeddingError;

const MAX_NB_CONN: usize = 16;
const NB_LAYERS: usize = 16;
const EF_CONSTRUCTION: usize = 200;
const EF_SEARCH: usize = 64;
const DEFAULT_CAPACITY: usize = 4096;

pub struct VectorIndex {
    dims: usize,
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// chunk id → internal label.
    id_map: HashMap<Uuid, usize>,
    /// internal label → chunk id.
    labels: Vec<Uuid>,
    /// internal label → vector, kept for exact re-scoring and rebuilds.
    vectors: Vec<Vec<f32>>,
    /// Labels removed from the id map but still present in the graph.
    tombstones: HashSet<usize>,
}

impl VectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            hnsw: new_graph(DEFAULT_CAPACITY),
            id_map: HashMap::new(),
            labels: Vec::new(),
            vectors: Vec::new(),
            tombstones: HashSet::new(),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.id_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_map.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Insert a vector for a chunk id; an existing entry for the same id
    /// is replaced.
    pub fn add(&mut self, chunk_id: Uuid, vector: Vec<f32>) -> Result<(), EmbeddingError> {
        if vector.len() != self.dims {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        if let Some(old) = self.id_map.remove(&chunk_id) {
            self.tombstones.insert(old);
        }
        let label = self.labels.len();
        self.hnsw.insert((vector.as_slice(), label));
        self.labels.push(chunk_id);
        self.vectors.push(vector);
        self.id_map.insert(chunk_id, label);
        Ok(())
    }

    /// Remove a chunk's entry. Removing an absent id is a no-op.
    pub fn remove(&mut self, chunk_id: &Uuid) {
        if let Some(label) = self.id_map.remove(chunk_id) {
            self.tombstones.insert(label);
            self.maybe_compact();
        }
    }

    /// Search for the `k` most similar live entries, sorted by cosine
    /// similarity descending.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(Uuid, f32)> {
        if k == 0 || self.id_map.is_empty() || query.len() != self.dims {
            return Vec::new();
        }

        // Oversample so tombstoned labels can be filtered out afterwards.
        let want = (k + self.tombstones.len()).min(self.labels.len());
        let ef = EF_SEARCH.max(2 * want);
        let neighbours = self.hnsw.search(query, want, ef);

        let mut seen: HashSet<usize> = HashSet::new();
        let mut results: Vec<(Uuid, f32)> = Vec::new();
        for n in neighbours {
            let label = n.d_id;
            if self.tombstones.contains(&label) || !seen.insert(label) {
                continue;
            }
            let score = cosine_similarity(query, &self.vectors[label]);
            results.push((self.labels[label], score));
        }

        // The graph can return too few live entries when tombstones
        // cluster near the query; a brute-force scan restores the
        // fewer-than-k-only-when-fewer-exist guarantee.
        if results.len() < k.min(self.len()) {
            results = self
                .id_map
                .iter()
                .map(|(id, &label)| (*id, cosine_similarity(query, &self.vectors[label])))
                .collect();
        }

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        results
    }

    /// True when the live id set equals `expected` exactly.
    pub fn matches_ids<'a, I>(&self, expected: I) -> bool
    where
        I: IntoIterator<Item = &'a Uuid>,
    {
        let expected: HashSet<&Uuid> = expected.into_iter().collect();
        expected.len() == self.id_map.len() && expected.iter().all(|id| self.id_map.contains_key(id))
    }

    /// Discard everything and rebuild from the given entries.
    pub fn rebuild<I>(&mut self, entries: I) -> Result<(), EmbeddingError>
    where
        I: IntoIterator<Item = (Uuid, Vec<f32>)>,
    {
        let entries: Vec<(Uuid, Vec<f32>)> = entries.into_iter().collect();
        self.hnsw = new_graph(entries.len().max(DEFAULT_CAPACITY));
        self.id_map.clear();
        self.labels.clear();
        self.vectors.clear();
        self.tombstones.clear();
        for (chunk_id, vector) in entries {
            self.add(chunk_id, vector)?;
        }
        Ok(())
    }

    /// Rebuild the graph once tombstones outnumber live entries.
    fn maybe_compact(&mut self) {
        if self.tombstones.len() <= self.id_map.len().max(MAX_NB_CONN) {
            return;
        }
        let live: Vec<(Uuid, Vec<f32>)> = self
            .id_map
            .iter()
            .map(|(id, &label)| (*id, self.vectors[label].clone()))
            .collect();
        // Dimensions were checked on the way in; rebuild cannot fail.
        let _ = self.rebuild(live);
    }
}

fn new_graph(capacity: usize) -> Hnsw<'static, f32, DistCosine> {
    Hnsw::new(MAX_NB_CONN, capacity.max(1), NB_LAYERS, EF_CONSTRUCTION, DistCosine {})
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dims: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn search_returns_most_similar_first() {
        let mut index = VectorIndex::new(4);
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            index.add(*id, unit(4, i)).unwrap();
        }

        let hits = index.search(&unit(4, 2), 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, ids[2]);
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn removed_entries_never_returned() {
        let mut index = VectorIndex::new(4);
        let keep = Uuid::new_v4();
        let gone = Uuid::new_v4();
        index.add(keep, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        index.add(gone, vec![0.9, 0.1, 0.0, 0.0]).unwrap();

        index.remove(&gone);
        let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, keep);
    }

    #[test]
    fn remove_absent_id_is_noop() {
        let mut index = VectorIndex::new(4);
        index.add(Uuid::new_v4(), unit(4, 0)).unwrap();
        index.remove(&Uuid::new_v4());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn fewer_than_k_only_when_fewer_exist() {
        let mut index = VectorIndex::new(4);
        for i in 0..3 {
            index.add(Uuid::new_v4(), unit(4, i)).unwrap();
        }
        assert_eq!(index.search(&unit(4, 0), 10).len(), 3);
        assert_eq!(index.search(&unit(4, 0), 2).len(), 2);
    }

    #[test]
    fn add_rejects_wrong_dimensionality() {
        let mut index = VectorIndex::new(4);
        let err = index.add(Uuid::new_v4(), vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { .. }));
    }

    #[test]
    fn replacing_an_id_keeps_len_stable() {
        let mut index = VectorIndex::new(4);
        let id = Uuid::new_v4();
        index.add(id, unit(4, 0)).unwrap();
        index.add(id, unit(4, 1)).unwrap();
        assert_eq!(index.len(), 1);

        let hits = index.search(&unit(4, 1), 1);
        assert_eq!(hits[0].0, id);
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn compaction_after_heavy_churn_keeps_results_correct() {
        let mut index = VectorIndex::new(8);
        let mut live = Vec::new();
        for i in 0..40 {
            let id = Uuid::new_v4();
            index.add(id, unit(8, i % 8)).unwrap();
            live.push(id);
        }
        // Remove most entries to force a rebuild.
        for id in live.drain(..32) {
            index.remove(&id);
        }
        assert_eq!(index.len(), 8);
        let hits = index.search(&unit(8, 0), 8);
        assert_eq!(hits.len(), 8);
        for (id, _) in hits {
            assert!(live.contains(&id));
        }
    }

    #[test]
    fn rebuild_replaces_contents() {
        let mut index = VectorIndex::new(4);
        index.add(Uuid::new_v4(), unit(4, 0)).unwrap();

        let fresh = Uuid::new_v4();
        index.rebuild(vec![(fresh, unit(4, 1))]).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.matches_ids([fresh].iter()));

        let hits = index.search(&unit(4, 1), 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, fresh);
    }
}
