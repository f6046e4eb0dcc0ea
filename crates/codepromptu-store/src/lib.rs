//! codepromptu-store - Canonical prompt storage and retrieval.
//!
//! Owns the versioned, lineage-aware collection of prompts with their
//! embeddings, the usage rows captured by the gateway, the cosine
//! similarity engine with SAME/FORK/NEW classification, and the
//! conversation correlator that reconstructs sessions from proxied calls.

pub mod embedder;
pub mod error;
pub mod index;
pub mod search;
pub mod service;
pub mod sessions;
pub mod store;

pub use embedder::{EmbedJob, EmbeddingWriter};
pub use error::StoreError;
pub use search::{SimilarityEngine, Thresholds};
pub use service::PromptService;
pub use sessions::{ConversationLog, MessageRecord};
pub use store::{AncestorChain, PromptFilter, PromptStore};
