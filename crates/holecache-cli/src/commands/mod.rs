//! Command implementations for the holecache CLI

mod config;
mod floors;
mod holes;
mod reindex;
mod session;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use holecache_core::{
    Config, ContentPipeline, ContentSource, HttpSource, RetainedStore, SessionStateManager,
    Storage, UserId,
};
use tracing::debug;

use crate::cli::Cli;

pub use config::execute as show_config;
pub use floors::execute as list_floors;
pub use holes::execute as list_holes;
pub use reindex::execute as reindex;
pub use session::execute as show_session;

/// Configuration and storage resolved once per invocation.
pub struct Context {
    pub config: Config,
    pub storage: Storage,
    pub user: UserId,
    pub json: bool,
    /// Shared by every stream and command so session writes serialize on one lock map.
    sessions: SessionStateManager,
}

impl Context {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = Config::load().context("Failed to load configuration")?;
        if cli.offline {
            config.defaults.content_source = ContentSource::Retained;
        }
        let storage = Storage::from_config(&config)?;
        let user = cli.user.unwrap_or(config.defaults.user_id);
        debug!(
            "User {user}, {:?} source, data root {}",
            config.defaults.content_source,
            storage.root_dir().display()
        );
        let sessions = storage.sessions(user);
        Ok(Self {
            config,
            storage,
            user,
            json: cli.json,
            sessions,
        })
    }

    pub fn store(&self) -> RetainedStore {
        self.storage.retained(self.user)
    }

    pub fn sessions(&self) -> SessionStateManager {
        self.sessions.clone()
    }

    /// Pipeline over the configured content source.
    pub fn pipeline(&self) -> Result<ContentPipeline> {
        let pipeline = match self.config.defaults.content_source {
            ContentSource::Retained => ContentPipeline::retained(self.store(), self.sessions()),
            ContentSource::Remote => {
                let remote = HttpSource::from_config(&self.config.remote)
                    .context("Failed to set up the forum client")?;
                ContentPipeline::remote(
                    Arc::new(remote),
                    self.store(),
                    self.sessions(),
                    self.config.defaults.page_size,
                )
            },
        };
        Ok(pipeline)
    }
}
