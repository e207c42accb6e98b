use crate::error::IndexError;

/// In-memory index contents: a sequence of normalized vectors and a
/// parallel sequence of identity keys.
///
/// The two sequences are always the same length and share ordinal
/// position as their join key. Positions are append-only: once a row
/// is assigned a position it never moves, because the persisted
/// identity mapping is positional.
///
/// Persistence is the façade's job; nothing here touches disk.
#[derive(Debug, Default, Clone)]
pub struct IndexStore {
    vectors: Vec<Vec<f32>>,
    identities: Vec<String>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from already-matched parallel sequences.
    /// Used by persistence on load; counts must already agree.
    pub(crate) fn from_parts(vectors: Vec<Vec<f32>>, identities: Vec<String>) -> Self {
        debug_assert_eq!(vectors.len(), identities.len());
        Self { vectors, identities }
    }

    /// Appends one normalized vector and its identity at the next
    /// ordinal position. Identities are not unique: one person may own
    /// many vectors, one per registered face.
    ///
    /// Returns the ordinal position assigned to the row.
    pub fn append(&mut self, vector: Vec<f32>, identity: String) -> usize {
        let pos = self.vectors.len();
        self.vectors.push(vector);
        self.identities.push(identity);
        debug_assert_eq!(self.vectors.len(), self.identities.len());
        pos
    }

    /// Discards prior contents and installs a new parallel pair.
    pub fn replace_all(
        &mut self,
        vectors: Vec<Vec<f32>>,
        identities: Vec<String>,
    ) -> Result<(), IndexError> {
        if vectors.is_empty() || identities.is_empty() {
            return Err(IndexError::Validation(
                "embeddings and identities must be non-empty".into(),
            ));
        }
        if vectors.len() != identities.len() {
            return Err(IndexError::Validation(format!(
                "length mismatch: {} embeddings, {} identities",
                vectors.len(),
                identities.len()
            )));
        }
        self.vectors = vectors;
        self.identities = identities;
        Ok(())
    }

    /// Empties both sequences.
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.identities.clear();
    }

    /// Current row count.
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.vectors.len(), self.identities.len());
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identity key at the given ordinal position.
    pub fn identity(&self, pos: usize) -> Option<&str> {
        self.identities.get(pos).map(String::as_str)
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn identities(&self) -> &[String] {
        &self.identities
    }
}
