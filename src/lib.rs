//! # Trellis
//!
//! The indexing core of a file-backed digital garden CMS.
//!
//! Articles are markdown files with YAML front matter, organised into
//! directories ("gardens"). Trellis keeps two secondary indexes in step with
//! that tree: a content index for listings, recency and link lookups, and a
//! full-text search index. Both can be updated on every save or marked stale
//! and rebuilt in one pass later.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐
//! │ DocumentStore│──▶│ IndexManager │──▶│ ContentIndex (pages) │
//! │ .md / .page  │   │ immediate or │   ├──────────────────────┤
//! └──────┬───────┘   │   deferred   │──▶│ SearchIndex (FTS5)   │
//!        │           └──────────────┘   └──────────┬───────────┘
//!        ▼                                         │
//! ┌──────────────┐   ┌──────────────┐              │
//! │ frontmatter  │   │ links        │◀─────────────┘
//! │ parse/serial │   │ [[target]]   │
//! └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! trellis --data-dir ./data init
//! trellis --data-dir ./data index rebuild
//! trellis --data-dir ./data search rebuild
//! trellis --data-dir ./data search query "getting started"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`error`] | Error taxonomy |
//! | [`frontmatter`] | Front matter parsing, serialization, effective dates |
//! | [`store`] | Document Store over the content tree |
//! | [`garden`] | Garden configuration and breadcrumbs |
//! | [`content_index`] | URL → metadata index |
//! | [`search_index`] | Full-text search index |
//! | [`memory`] | In-memory index backends |
//! | [`links`] | `[[link]]` resolution and `{{include}}` expansion |
//! | [`render`] | Renderer seam and page rendering |
//! | [`corpus`] | URL derivation and the full corpus walk |
//! | [`index_manager`] | Immediate/deferred index maintenance |
//! | [`dirty`] | Persisted stale-index marker |
//! | [`editor`] | Save and delete workflows |
//! | [`vcs`] | Version control hook |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod content_index;
pub mod corpus;
pub mod db;
pub mod dirty;
pub mod editor;
pub mod error;
pub mod frontmatter;
pub mod garden;
pub mod index_cmd;
pub mod index_manager;
pub mod links;
pub mod links_cmd;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod render;
pub mod search_cmd;
pub mod search_index;
pub mod stats;
pub mod store;
pub mod vcs;

pub use error::{TrellisError, TrellisResult};
