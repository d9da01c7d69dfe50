//! # holecache-core
//!
//! Retention and caching for an offline-capable forum reader.
//!
//! Everything read from the forum API is captured on local disk as it streams past, and
//! can be replayed later in the same order without any network access.
//!
//! ## Architecture
//!
//! - **Documents**: one JSON document per entity, written atomically
//! - **Range index**: a compact persisted set of identifier spans per entity kind
//! - **Retained store**: per-user storage and ordered enumeration of holes, floors and tags
//! - **Session state**: navigation documents that let listings resume where they stopped
//! - **Content pipeline**: one lazy stream over either the remote API or the retained store
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use holecache_core::{Config, ContentPipeline, HoleQuery, Storage};
//!
//! # async fn run() -> holecache_core::Result<()> {
//! let config = Config::load()?;
//! let storage = Storage::from_config(&config)?;
//! let user = config.defaults.user_id;
//!
//! let pipeline = ContentPipeline::retained(storage.retained(user), storage.sessions(user));
//! let mut holes = pipeline.holes(HoleQuery::default());
//! while let Some(bundle) = holes.try_next().await? {
//!     println!("#{} ({} replies)", bundle.hole.id, bundle.hole.reply);
//! }
//! # Ok(())
//! # }
//! ```

/// Configuration loading, saving and environment overrides
pub mod config;
/// Single-entity JSON documents on disk
pub mod document;
/// Error types and result aliases
pub mod error;
/// HTTP client for the forum API
pub mod fetcher;
/// Source-agnostic listing streams
pub mod pipeline;
/// Persisted sets of identifier spans
pub mod range_index;
/// Per-user retained entity collections
pub mod retained;
/// Navigation state documents
pub mod session;
/// Data root and user namespaces
pub mod storage;
/// Forum entities and session documents
pub mod types;

pub use config::{Config, DefaultsConfig, PathsConfig, RemoteConfig};
pub use error::{Error, Result};
pub use fetcher::HttpSource;
pub use pipeline::{
    ContentPipeline, ContentSource, FloorPageRequest, FloorQuery, FloorStart, HolePageRequest,
    HoleQuery, HoleStart, RemoteSource,
};
pub use range_index::{Direction, RangeIndex};
pub use retained::{EntityKind, Retained, RetainedStore};
pub use session::SessionStateManager;
pub use storage::{Storage, UserId};
pub use types::*;
