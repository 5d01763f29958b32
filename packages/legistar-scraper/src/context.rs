//! The crawl context handed to every scraper.

use chrono_tz::Tz;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::http::{Fetcher, ReqwestTransport};
use crate::normalize::VoteOptionMap;
use crate::session::PostbackSession;
use crate::traits::hooks::{DefaultHooks, JurisdictionHooks, Registry};
use crate::traits::transport::Transport;
use crate::types::config::{CrawlSettings, JurisdictionConfig};
use crate::types::page::{FieldMap, FieldValue};

/// Immutable bundle of what one jurisdiction's crawl needs.
///
/// Scrapers borrow it; nothing in it changes during a crawl. Per-crawl
/// mutable state (postback tokens) lives in the [`PostbackSession`]s it
/// creates.
#[derive(Clone)]
pub struct CrawlContext {
    pub config: Arc<JurisdictionConfig>,
    pub settings: CrawlSettings,
    pub fetcher: Fetcher,
    pub hooks: Arc<dyn JurisdictionHooks>,
}

impl CrawlContext {
    pub fn new(
        config: JurisdictionConfig,
        settings: CrawlSettings,
        fetcher: Fetcher,
        hooks: Arc<dyn JurisdictionHooks>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            settings,
            fetcher,
            hooks,
        }
    }

    /// Context over the real HTTP transport, with hooks looked up by the
    /// jurisdiction id.
    pub fn connect(config: JurisdictionConfig, settings: CrawlSettings, registry: &Registry) -> Result<Self> {
        config.tz()?;
        let transport = ReqwestTransport::from_settings(&settings)?;
        let fetcher = Fetcher::from_settings(Arc::new(transport), &settings);
        let hooks = registry.get(&config.id);
        info!(
            jurisdiction = %config.id,
            rpm = settings.requests_per_minute,
            cache = ?settings.cache_dir,
            "Crawl context ready"
        );
        Ok(Self::new(config, settings, fetcher, hooks))
    }

    /// Context over any transport with default settings and hooks.
    pub fn with_transport(config: JurisdictionConfig, transport: Arc<dyn Transport>) -> Self {
        let settings = CrawlSettings::default();
        let fetcher = Fetcher::from_settings(transport, &settings);
        Self::new(config, settings, fetcher, Arc::new(DefaultHooks))
    }

    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn JurisdictionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// A fresh postback session. Each concurrent crawl needs its own.
    pub fn session(&self) -> PostbackSession<'_> {
        PostbackSession::new(&self.fetcher)
    }

    pub fn tz(&self) -> Result<Tz> {
        self.config.tz()
    }

    /// Defaults, then configured overrides, then hook overrides.
    pub fn vote_options(&self) -> VoteOptionMap {
        let hook_options = self.hooks.vote_options();
        VoteOptionMap::new()
            .with_overrides(&self.config.vote_options)
            .with_overrides(&hook_options)
    }

    /// Label text for a logical field name.
    pub fn label<'a>(&'a self, logical: &'a str) -> &'a str {
        self.config.labels.get(logical)
    }

    /// Value under a logical field unless blank on this deployment.
    pub fn field<'r>(&self, fields: &'r IndexMap<String, FieldValue>, logical: &str) -> Option<&'r FieldValue> {
        fields.present_among(self.label(logical), &self.config.not_available)
    }

    /// Visible text under a logical field unless blank on this deployment.
    pub fn field_text(&self, fields: &IndexMap<String, FieldValue>, logical: &str) -> Option<String> {
        self.field(fields, logical).map(|v| v.label())
    }
}
