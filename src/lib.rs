//! elgold - maintenance tools for an entity-linked text corpus.
//!
//! Documents are plain text files named `<category>_<serial>.txt` with inline
//! entity markup `{{mention|CLASS|target}}`, where `target` is a knowledge-base
//! title or empty. The crate loads such a dataset, checks link targets against
//! a knowledge base, rewrites copies of it and exports evaluation formats.

pub mod config;
pub mod corpus;
pub mod curation;
pub mod error;
pub mod export;
pub mod knowledge;
pub mod linking;
pub mod markup;
pub mod output;
pub mod reconcile;

pub use config::Config;
pub use corpus::{Corpus, Document, Line};
pub use error::{CorpusError, CorpusResult};
pub use knowledge::{KnowledgeBase, Snapshot, TargetResolution, Wikipedia};
pub use linking::{CategoryGroups, LinkingRecord};
pub use markup::{parse_line, Entity, MarkupError, Token};
pub use reconcile::{AutoApprove, DecisionProvider, PromptDecider, ReconcilePolicy};
