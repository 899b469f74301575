//! Store configuration.
//!
//! [`Configuration`] is what an [`EntityDataStore`](crate::EntityDataStore) is
//! built from. Values can be set in code through [`ConfigurationBuilder`] or loaded
//! with [`StoreSettings::load`] from `config/config.toml` (the `[store]` table) and
//! `QUARRY__STORE__*` environment variables.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::driver::ConnectionProvider;
use crate::error::{QuarryError, Result};
use crate::listener::{EntityListener, LoggingListener, StatementListener};
use crate::meta::EntityModel;
use crate::sql::{BuilderOptions, Platform};
use crate::transaction::IsolationLevel;

pub use crate::sql::NameTransform;

pub const DEFAULT_BATCH_UPDATE_SIZE: usize = 1000;
pub const DEFAULT_STATEMENT_CACHE_SIZE: usize = 32;

/// Everything a store needs; cheap to clone
#[derive(Clone)]
pub struct Configuration {
    pub(crate) model: Arc<EntityModel>,
    pub(crate) provider: Arc<dyn ConnectionProvider>,
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) batch_update_size: usize,
    pub(crate) statement_cache_size: usize,
    pub(crate) options: BuilderOptions,
    pub(crate) transaction_isolation: Option<IsolationLevel>,
    pub(crate) entity_listeners: Vec<Arc<dyn EntityListener>>,
    pub(crate) statement_listeners: Vec<Arc<dyn StatementListener>>,
}

impl Configuration {
    pub fn builder(
        provider: Arc<dyn ConnectionProvider>,
        model: Arc<EntityModel>,
    ) -> ConfigurationBuilder {
        ConfigurationBuilder::new(provider, model)
    }

    pub fn model(&self) -> &Arc<EntityModel> {
        &self.model
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn provider(&self) -> &Arc<dyn ConnectionProvider> {
        &self.provider
    }

    pub fn batch_update_size(&self) -> usize {
        self.batch_update_size
    }

    pub fn statement_cache_size(&self) -> usize {
        self.statement_cache_size
    }

    pub fn builder_options(&self) -> &BuilderOptions {
        &self.options
    }

    pub fn transaction_isolation(&self) -> Option<IsolationLevel> {
        self.transaction_isolation
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("model", &self.model.name())
            .field("platform", &self.platform.name())
            .field("batch_update_size", &self.batch_update_size)
            .field("statement_cache_size", &self.statement_cache_size)
            .field("options", &self.options)
            .field("transaction_isolation", &self.transaction_isolation)
            .field("entity_listeners", &self.entity_listeners.len())
            .field("statement_listeners", &self.statement_listeners.len())
            .finish()
    }
}

/// Fluent builder for [`Configuration`]
pub struct ConfigurationBuilder {
    model: Arc<EntityModel>,
    provider: Arc<dyn ConnectionProvider>,
    platform: Option<Arc<dyn Platform>>,
    batch_update_size: usize,
    statement_cache_size: usize,
    options: BuilderOptions,
    transaction_isolation: Option<IsolationLevel>,
    use_default_logging: bool,
    entity_listeners: Vec<Arc<dyn EntityListener>>,
    statement_listeners: Vec<Arc<dyn StatementListener>>,
}

impl ConfigurationBuilder {
    pub fn new(provider: Arc<dyn ConnectionProvider>, model: Arc<EntityModel>) -> Self {
        Self {
            model,
            provider,
            platform: None,
            batch_update_size: DEFAULT_BATCH_UPDATE_SIZE,
            statement_cache_size: DEFAULT_STATEMENT_CACHE_SIZE,
            options: BuilderOptions::default(),
            transaction_isolation: None,
            use_default_logging: false,
            entity_listeners: Vec::new(),
            statement_listeners: Vec::new(),
        }
    }

    /// Overrides the platform reported by the connection provider
    pub fn platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Rows per batch for `insert_all`/`delete_all`
    pub fn batch_update_size(mut self, size: usize) -> Self {
        self.batch_update_size = size;
        self
    }

    pub fn statement_cache_size(mut self, size: usize) -> Self {
        self.statement_cache_size = size;
        self
    }

    pub fn quote_table_names(mut self, quote: bool) -> Self {
        self.options.quote_tables = quote;
        self
    }

    pub fn quote_column_names(mut self, quote: bool) -> Self {
        self.options.quote_columns = quote;
        self
    }

    pub fn table_transform(mut self, transform: NameTransform) -> Self {
        self.options.table_transform = Some(transform);
        self
    }

    pub fn column_transform(mut self, transform: NameTransform) -> Self {
        self.options.column_transform = Some(transform);
        self
    }

    /// Isolation level for transactions started with `begin()`
    pub fn transaction_isolation(mut self, level: IsolationLevel) -> Self {
        self.transaction_isolation = Some(level);
        self
    }

    /// Registers a [`LoggingListener`] for statements and entity writes
    pub fn use_default_logging(mut self, enabled: bool) -> Self {
        self.use_default_logging = enabled;
        self
    }

    pub fn entity_listener(mut self, listener: Arc<dyn EntityListener>) -> Self {
        self.entity_listeners.push(listener);
        self
    }

    pub fn statement_listener(mut self, listener: Arc<dyn StatementListener>) -> Self {
        self.statement_listeners.push(listener);
        self
    }

    /// Applies loaded settings on top of what has been set so far
    pub fn settings(mut self, settings: &StoreSettings) -> Self {
        self.batch_update_size = settings.batch_update_size;
        self.statement_cache_size = settings.statement_cache_size;
        self.options.quote_tables = settings.quote_table_names;
        self.options.quote_columns = settings.quote_column_names;
        self.use_default_logging = settings.use_default_logging;
        if let Some(level) = settings.transaction_isolation {
            self.transaction_isolation = Some(level);
        }
        if let Some(naming) = settings.column_naming {
            self.options.column_transform = Some(naming.transform());
        }
        if let Some(naming) = settings.table_naming {
            self.options.table_transform = Some(naming.transform());
        }
        self
    }

    /// # Errors
    ///
    /// [`QuarryError::Configuration`] when the batch size is zero.
    pub fn build(mut self) -> Result<Configuration> {
        if self.batch_update_size == 0 {
            return Err(QuarryError::Configuration(
                "batch_update_size must be greater than zero".to_string(),
            ));
        }
        if self.use_default_logging {
            self.statement_listeners.push(Arc::new(LoggingListener));
            self.entity_listeners.push(Arc::new(LoggingListener));
        }
        let platform = self
            .platform
            .unwrap_or_else(|| self.provider.platform());
        Ok(Configuration {
            model: self.model,
            provider: self.provider,
            platform,
            batch_update_size: self.batch_update_size,
            statement_cache_size: self.statement_cache_size,
            options: self.options,
            transaction_isolation: self.transaction_isolation,
            entity_listeners: self.entity_listeners,
            statement_listeners: self.statement_listeners,
        })
    }
}

/// Identifier naming applied by a loaded [`StoreSettings`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Naming {
    Lowercase,
    SnakeCase,
}

impl Naming {
    fn transform(self) -> NameTransform {
        match self {
            Naming::Lowercase => NameTransform::lowercase(),
            Naming::SnakeCase => NameTransform::snake_case(),
        }
    }
}

/// Settings read from files and the environment
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Connection URL, see [`crate::connection::connect`]
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_batch_update_size")]
    pub batch_update_size: usize,
    #[serde(default = "default_statement_cache_size")]
    pub statement_cache_size: usize,
    #[serde(default)]
    pub quote_table_names: bool,
    #[serde(default)]
    pub quote_column_names: bool,
    #[serde(default)]
    pub use_default_logging: bool,
    #[serde(default)]
    pub transaction_isolation: Option<IsolationLevel>,
    #[serde(default)]
    pub table_naming: Option<Naming>,
    #[serde(default)]
    pub column_naming: Option<Naming>,
}

fn default_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_batch_update_size() -> usize {
    DEFAULT_BATCH_UPDATE_SIZE
}

fn default_statement_cache_size() -> usize {
    DEFAULT_STATEMENT_CACHE_SIZE
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            batch_update_size: DEFAULT_BATCH_UPDATE_SIZE,
            statement_cache_size: DEFAULT_STATEMENT_CACHE_SIZE,
            quote_table_names: false,
            quote_column_names: false,
            use_default_logging: false,
            transaction_isolation: None,
            table_naming: None,
            column_naming: None,
        }
    }
}

const ENV_PREFIX: &str = "QUARRY";
const DEFAULT_CONFIG_FILE: &str = "config/config.toml";

impl StoreSettings {
    /// Loads the `[store]` table from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Loads the `[store]` table from `path` (optional) overridden by
    /// `QUARRY__STORE__*` environment variables. A missing table yields defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // An unreadable file should not hide the environment
                if path.exists() {
                    log::warn!(
                        "failed to load {}, falling back to env: {err}",
                        path.display()
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        match settings.get::<StoreSettings>("store") {
            Ok(store) => Ok(store),
            Err(ConfigError::NotFound(_)) => Ok(StoreSettings::default()),
            Err(e) => Err(QuarryError::Configuration(format!(
                "store settings could not be loaded: {e}"
            ))),
        }
    }
}
