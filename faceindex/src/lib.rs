//! Durable face-embedding index with exact cosine top-k search.
//!
//! Embeddings are L2-normalized on the way in and stored next to their
//! identity keys in two parallel append-only sequences; the ordinal
//! position of a vector is its join key to the identity. Search is an
//! exhaustive inner-product scan, which on unit vectors is cosine
//! similarity. Every mutation is saved to a pair of companion files
//! (binary vectors + human-inspectable JSON identities) before the call
//! returns.
//!
//! # Usage
//!
//! ```
//! use faceindex::{Config, FaceIndex};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let index = FaceIndex::open(Config {
//!     dim: 4,
//!     vector_path: dir.path().join("face_index.bin"),
//!     identity_path: dir.path().join("face_metadata.json"),
//! }).unwrap();
//!
//! // Bootstrap from the source-of-truth store, once, at startup.
//! index.build(
//!     vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
//!     vec!["alice".into(), "bob".into()],
//! ).unwrap();
//!
//! // Registration flow: one append per new face, durable on return.
//! index.add(&[0.9, 0.1, 0.0, 0.0], "alice").unwrap();
//!
//! // Recognition flow: top-k above a similarity threshold.
//! let result = index.search(&[1.0, 0.0, 0.0, 0.0], 5, 0.6).unwrap();
//! assert_eq!(result.matches[0].person_id, "alice");
//! ```
//!
//! # Design
//!
//! The index is exact and brute-force. There is no per-row deletion or
//! update: positions are append-only because the persisted identity
//! mapping is positional, and [`FaceIndex::reset`] plus a rebuild from
//! the source of truth is the supported way to drop stale rows.

mod error;
mod faceindex;
mod norm;
mod persist;
mod search;
mod store;

pub use error::IndexError;
pub use faceindex::{BatchOutcome, BatchReport, Config, FaceIndex};
pub use norm::{dot, l2_normalize, l2_normalize_batch};
pub use persist::Persistence;
pub use search::{SearchMatch, SearchResult};
pub use store::IndexStore;
