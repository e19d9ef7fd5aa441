//! The plugin event bus.
//!
//! Plugins subscribe to engine events through a mask and receive a
//! [`PluginEvent`] value; the event around the repomd fetch is mutable so
//! a plugin can substitute download URLs. The metalink plugin is compiled
//! in and registered for every repo that declares `metalink=`.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use tundra_fetch::{Fetcher, SilentProgress};
use tundra_repodata::Metalink;
use tundra_types::RepoConfig;

use crate::error::Result;

/// Repo configuration was loaded.
pub const EVENT_REPO_READCONFIG: u32 = 1 << 0;
/// The repomd fetch of a repo is about to start.
pub const EVENT_REPO_MD_DOWNLOAD_START: u32 = 1 << 1;
/// The repomd fetch of a repo finished.
pub const EVENT_REPO_MD_DOWNLOAD_END: u32 = 1 << 2;

/// One engine event, carrying the context the original C implementation
/// exposed through typed context items.
pub enum PluginEvent<'a> {
    /// A repo definition was loaded and finalized.
    RepoReadConfig {
        /// The repo.
        repo: &'a RepoConfig,
    },
    /// The repomd fetch is about to start. `base_urls` may be replaced.
    RepoMdDownloadStart {
        /// The repo being refreshed.
        repo_id: &'a str,
        /// The repo's cache root.
        cache_dir: &'a Path,
        /// Staging directory for plugin downloads.
        tmp_dir: &'a Path,
        /// Transfer engine for this repo.
        fetcher: &'a Fetcher,
        /// URLs the refresh will try, in order. Mutable by design.
        base_urls: &'a mut Vec<String>,
    },
    /// The repomd fetch finished and the file sits at `repomd_path`.
    RepoMdDownloadEnd {
        /// The repo being refreshed.
        repo_id: &'a str,
        /// The repo's cache root.
        cache_dir: &'a Path,
        /// The downloaded index.
        repomd_path: &'a Path,
    },
}

impl PluginEvent<'_> {
    /// The mask bit of this event.
    pub fn mask(&self) -> u32 {
        match self {
            PluginEvent::RepoReadConfig { .. } => EVENT_REPO_READCONFIG,
            PluginEvent::RepoMdDownloadStart { .. } => EVENT_REPO_MD_DOWNLOAD_START,
            PluginEvent::RepoMdDownloadEnd { .. } => EVENT_REPO_MD_DOWNLOAD_END,
        }
    }
}

/// A plugin: advertises the events it wants and handles them.
pub trait Plugin {
    /// Plugin name for diagnostics.
    fn name(&self) -> &str;

    /// Bitmask of `EVENT_*` values this plugin subscribes to.
    fn event_mask(&self) -> u32;

    /// Handle one event.
    fn on_event(&mut self, event: &mut PluginEvent<'_>) -> Result<()>;
}

/// Owns the registered plugins and dispatches events by mask.
#[derive(Default)]
pub struct PluginBus {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), "registered plugin");
        self.plugins.push(plugin);
    }

    /// Dispatch an event to every subscribed plugin, in registration
    /// order. The first error aborts the dispatch.
    pub fn dispatch(&mut self, event: &mut PluginEvent<'_>) -> Result<()> {
        let mask = event.mask();
        for plugin in &mut self.plugins {
            if plugin.event_mask() & mask != 0 {
                plugin.on_event(event)?;
            }
        }
        Ok(())
    }
}

/// The metalink plugin: substitutes base URLs before the repomd fetch and
/// cross-checks the downloaded `repomd.xml` against the metalink digests
/// afterwards.
pub struct MetalinkPlugin {
    /// repo id -> metalink URL
    urls: HashMap<String, String>,
    /// repo id -> parsed document, kept between the start and end events
    parsed: HashMap<String, Metalink>,
}

impl MetalinkPlugin {
    /// Build from the loaded registry: one entry per repo with
    /// `metalink=`.
    pub fn from_repos<'a>(repos: impl Iterator<Item = &'a RepoConfig>) -> Self {
        let urls = repos
            .filter_map(|repo| {
                repo.metalink
                    .as_ref()
                    .map(|url| (repo.id.clone(), url.clone()))
            })
            .collect();
        Self {
            urls,
            parsed: HashMap::new(),
        }
    }

    /// Whether any repo uses a metalink.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl Plugin for MetalinkPlugin {
    fn name(&self) -> &str {
        "metalink"
    }

    fn event_mask(&self) -> u32 {
        EVENT_REPO_MD_DOWNLOAD_START | EVENT_REPO_MD_DOWNLOAD_END
    }

    fn on_event(&mut self, event: &mut PluginEvent<'_>) -> Result<()> {
        match event {
            PluginEvent::RepoMdDownloadStart {
                repo_id,
                tmp_dir,
                fetcher,
                base_urls,
                ..
            } => {
                let Some(url) = self.urls.get(*repo_id) else {
                    return Ok(());
                };
                let dest = tmp_dir.join("metalink");
                fetcher.fetch_url(url, &dest, &SilentProgress)?;
                let metalink = Metalink::from_reader(std::io::BufReader::new(
                    fs_err::File::open(&dest)?,
                ))?;
                let urls = metalink.base_urls();
                info!(
                    repo = *repo_id,
                    mirrors = urls.len(),
                    "substituting base urls from metalink"
                );
                **base_urls = urls;
                self.parsed.insert(repo_id.to_string(), metalink);
                Ok(())
            }
            PluginEvent::RepoMdDownloadEnd {
                repo_id,
                repomd_path,
                ..
            } => {
                if let Some(metalink) = self.parsed.get(*repo_id) {
                    metalink.verify_file(repomd_path)?;
                    debug!(repo = *repo_id, "repomd matches metalink digests");
                }
                Ok(())
            }
            PluginEvent::RepoReadConfig { .. } => Ok(()),
        }
    }
}
