//! Process-wide configuration: provider selection, fusion constants, search and backfill knobs.
//!
//! Every struct here is built once at startup and shared read-only afterwards.

use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::Serialize;

use crate::error::ConfigError;
use crate::item::{parse_kinds, ItemKind};

/// Largest page a caller may request.
pub const MAX_PER_PAGE: usize = 50;
/// Page size used when the caller does not specify one.
pub const DEFAULT_PER_PAGE: usize = 20;
/// Deepest page a caller may request.
pub const MAX_PAGE: usize = 100;
/// Upper bound on rows fetched from one ranking; enough to serve every reachable page.
pub const MAX_CANDIDATE_POOL: usize = MAX_PAGE * MAX_PER_PAGE + 1;
/// Slowest pacing accepted for a backfill, in items per second.
pub const MIN_BACKFILL_RATE: f64 = 0.001;

/// Embedding provider family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Remote, asymmetric (documents and queries are embedded differently).
    Voyage,
    /// Local OpenAI-compatible server, symmetric.
    Ollama,
}

impl ProviderKind {
    /// Label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Voyage => "voyage",
            ProviderKind::Ollama => "ollama",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Voyage => "https://api.voyageai.com/v1",
            ProviderKind::Ollama => "http://localhost:11434/v1",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Voyage => "voyage-code-3",
            ProviderKind::Ollama => "nomic-embed-text",
        }
    }

    /// Vector length the default model produces.
    pub fn default_dimensions(self) -> usize {
        match self {
            ProviderKind::Voyage => 1024,
            ProviderKind::Ollama => 768,
        }
    }

    // ~4 characters per token.
    fn default_max_input_chars(self) -> usize {
        match self {
            ProviderKind::Voyage => 8000 * 4,
            ProviderKind::Ollama => 2048 * 4,
        }
    }

    /// Whether a credential must be supplied.
    pub fn requires_api_key(self) -> bool {
        matches!(self, ProviderKind::Voyage)
    }
}

/// Selection and tuning of the single active embedding provider.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingProviderConfig {
    /// Provider family.
    pub kind: ProviderKind,
    /// API root; `/embeddings` is appended.
    pub base_url: String,
    /// Bearer credential for remote providers.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Vector length every stored embedding must have.
    pub dimensions: usize,
    /// Per-call deadline for write-path embedding calls.
    pub timeout: Duration,
    /// Inputs longer than this many characters are cut to their prefix.
    pub max_input_chars: usize,
}

impl EmbeddingProviderConfig {
    /// Defaults for a provider family.
    pub fn for_kind(kind: ProviderKind) -> Self {
        Self {
            kind,
            base_url: kind.default_base_url().to_string(),
            api_key: None,
            model: kind.default_model().to_string(),
            dimensions: kind.default_dimensions(),
            timeout: Duration::from_secs(30),
            max_input_chars: kind.default_max_input_chars(),
        }
    }

    /// Remote asymmetric provider with the given credential.
    pub fn voyage(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::for_kind(ProviderKind::Voyage)
        }
    }

    /// Local symmetric provider at `base_url` (default when `None`).
    pub fn ollama(base_url: Option<String>) -> Self {
        let mut config = Self::for_kind(ProviderKind::Ollama);
        if let Some(url) = base_url {
            config.base_url = url;
        }
        config
    }

    /// Rejects configurations no provider could serve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind.requires_api_key()
            && self
                .api_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            return Err(ConfigError::new(
                "embedding_provider_api_key",
                format!("required for the {} provider", self.kind.as_str()),
            ));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::new(
                "embedding_provider_base_url",
                "must be an http(s) URL",
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::new("embedding_model", "must not be empty"));
        }
        if self.dimensions == 0 {
            return Err(ConfigError::new("embedding_dimensions", "must be positive"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::new("embedding_timeout", "must be positive"));
        }
        if self.max_input_chars == 0 {
            return Err(ConfigError::new("max_input_chars", "must be positive"));
        }
        Ok(())
    }
}

/// Reciprocal Rank Fusion constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FusionConfig {
    /// Rank dampening constant.
    pub k: f64,
    /// Multiplier for the lexical contribution.
    pub lexical_weight: f64,
    /// Multiplier for the semantic contribution.
    pub semantic_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k: 60.0,
            lexical_weight: 1.0,
            semantic_weight: 1.0,
        }
    }
}

impl FusionConfig {
    /// `k` and the lexical weight must be positive; the semantic weight may be zero.
    ///
    /// A zero lexical weight would flatten every full-text-only score to zero and
    /// let the tie-break reorder a degraded response.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.k.is_finite() && self.k > 0.0) {
            return Err(ConfigError::new("rrf_k", "must be a positive number"));
        }
        if !(self.lexical_weight.is_finite() && self.lexical_weight > 0.0) {
            return Err(ConfigError::new("lexical_weight", "must be a positive number"));
        }
        if !(self.semantic_weight.is_finite() && self.semantic_weight >= 0.0) {
            return Err(ConfigError::new(
                "semantic_weight",
                "must be a non-negative number",
            ));
        }
        Ok(())
    }
}

/// Query-time behavior of the orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchConfig {
    /// Fusion constants.
    pub fusion: FusionConfig,
    /// Minimum number of candidates fetched from each ranking.
    pub candidate_pool: usize,
    /// Hard deadline for obtaining the query embedding, retries included.
    pub query_embed_timeout: Duration,
    /// Deadline for each ranking call against the datastore.
    pub store_timeout: Duration,
    /// Master switch for the semantic path.
    pub semantic_enabled: bool,
    /// Query embeddings kept in memory (0 disables caching).
    pub embedding_cache_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            candidate_pool: 60,
            query_embed_timeout: Duration::from_secs(3),
            store_timeout: Duration::from_secs(5),
            semantic_enabled: true,
            embedding_cache_size: 1024,
        }
    }
}

impl SearchConfig {
    /// Checks fusion constants and bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fusion.validate()?;
        if self.candidate_pool == 0 {
            return Err(ConfigError::new("candidate_pool", "must be positive"));
        }
        if self.candidate_pool > MAX_CANDIDATE_POOL {
            return Err(ConfigError::new(
                "candidate_pool",
                format!("must be at most {MAX_CANDIDATE_POOL}"),
            ));
        }
        if self.query_embed_timeout.is_zero() {
            return Err(ConfigError::new("query_embed_timeout", "must be positive"));
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::new("store_timeout", "must be positive"));
        }
        Ok(())
    }
}

/// Tuning for one backfill run.
#[derive(Clone, Debug, PartialEq)]
pub struct BackfillConfig {
    /// Items selected per batch.
    pub batch_size: usize,
    /// Content tables to process.
    pub kinds: Vec<ItemKind>,
    /// Item throughput cap; 0 disables pacing.
    pub rate_per_second: f64,
    /// Provider calls in flight within a batch.
    pub concurrency: usize,
    /// Compute embeddings without writing them.
    pub dry_run: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            kinds: ItemKind::ALL.to_vec(),
            rate_per_second: 50.0,
            concurrency: 1,
            dry_run: false,
        }
    }
}

impl BackfillConfig {
    /// Rejects values the worker cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::new("backfill_batch_size", "must be positive"));
        }
        if self.kinds.is_empty() {
            return Err(ConfigError::new("backfill_kinds", "select at least one"));
        }
        let rate = self.rate_per_second;
        if !(rate.is_finite() && (rate == 0.0 || rate >= MIN_BACKFILL_RATE)) {
            return Err(ConfigError::new(
                "backfill_rate_per_second",
                format!("must be 0 (unpaced) or at least {MIN_BACKFILL_RATE}"),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::new("backfill_concurrency", "must be positive"));
        }
        Ok(())
    }

    /// Shortest wall time a batch of `items` may take under the rate cap.
    pub fn min_batch_duration(&self, items: usize) -> Duration {
        if self.rate_per_second <= 0.0 || items == 0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(items as f64 / self.rate_per_second).unwrap_or(Duration::MAX)
    }
}

/// Embedding provider flags shared by binaries.
#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    /// Active provider family
    #[arg(long, env = "EMBEDDING_PROVIDER", value_enum, default_value = "voyage")]
    pub embedding_provider: ProviderKind,

    /// Credential for remote providers
    #[arg(long, env = "EMBEDDING_PROVIDER_API_KEY", hide_env_values = true)]
    pub embedding_provider_api_key: Option<String>,

    /// Endpoint override (local providers)
    #[arg(long, env = "EMBEDDING_PROVIDER_BASE_URL")]
    pub embedding_provider_base_url: Option<String>,

    /// Model identifier override
    #[arg(long, env = "EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Vector dimensionality override
    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Seconds before a provider call times out
    #[arg(long, env = "EMBEDDING_TIMEOUT_SECS")]
    pub embedding_timeout_secs: Option<u64>,
}

impl ProviderArgs {
    /// Resolves flags over provider defaults and validates the result.
    pub fn build(&self) -> Result<EmbeddingProviderConfig, ConfigError> {
        let mut config = EmbeddingProviderConfig::for_kind(self.embedding_provider);
        config.api_key = self
            .embedding_provider_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        if let Some(url) = &self.embedding_provider_base_url {
            config.base_url = url.trim().to_string();
        }
        if let Some(model) = &self.embedding_model {
            config.model = model.trim().to_string();
        }
        if let Some(dims) = self.embedding_dimensions {
            config.dimensions = dims;
        }
        if let Some(secs) = self.embedding_timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Query-time flags.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Reciprocal Rank Fusion constant (higher softens rank differences)
    #[arg(long, env = "SEARCH_RRF_K", default_value_t = 60.0)]
    pub rrf_k: f64,

    /// Weight of the lexical ranking
    #[arg(long, env = "SEARCH_LEXICAL_WEIGHT", default_value_t = 1.0)]
    pub lexical_weight: f64,

    /// Weight of the semantic ranking
    #[arg(long, env = "SEARCH_SEMANTIC_WEIGHT", default_value_t = 1.0)]
    pub semantic_weight: f64,

    /// Minimum candidates fetched from each ranking before fusion
    #[arg(long, env = "SEARCH_CANDIDATE_POOL", default_value_t = 60)]
    pub candidate_pool: usize,

    /// Milliseconds allowed for the query embedding before falling back to full-text
    #[arg(long, env = "SEARCH_QUERY_EMBED_TIMEOUT_MS", default_value_t = 3000)]
    pub query_embed_timeout_ms: u64,

    /// Deadline for each ranking query, in milliseconds
    #[arg(long, env = "SEARCH_STORE_TIMEOUT_MS", default_value_t = 5000)]
    pub store_timeout_ms: u64,

    /// Attempt semantic ranking at all
    #[arg(long, env = "SEARCH_SEMANTIC_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub semantic_enabled: bool,

    /// Max cached query embeddings (0 disables caching)
    #[arg(long, env = "SEARCH_EMBEDDING_CACHE_SIZE", default_value_t = 1024)]
    pub embedding_cache_size: usize,
}

impl SearchArgs {
    /// Converts flags into a validated [`SearchConfig`].
    pub fn build(&self) -> Result<SearchConfig, ConfigError> {
        let config = SearchConfig {
            fusion: FusionConfig {
                k: self.rrf_k,
                lexical_weight: self.lexical_weight,
                semantic_weight: self.semantic_weight,
            },
            candidate_pool: self.candidate_pool,
            query_embed_timeout: Duration::from_millis(self.query_embed_timeout_ms),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            semantic_enabled: self.semantic_enabled,
            embedding_cache_size: self.embedding_cache_size,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Backfill flags.
#[derive(Args, Debug, Clone)]
pub struct BackfillArgs {
    /// Items selected per batch
    #[arg(long, env = "BACKFILL_BATCH_SIZE", default_value_t = 100)]
    pub backfill_batch_size: usize,

    /// Items embedded per second at most (0 disables pacing)
    #[arg(long, env = "BACKFILL_RATE_PER_SECOND", default_value_t = 50.0)]
    pub backfill_rate_per_second: f64,

    /// Content types to process, comma separated
    #[arg(long, env = "BACKFILL_KINDS", default_value = "posts,answers,approaches")]
    pub backfill_kinds: String,

    /// Provider calls in flight within one batch
    #[arg(long, env = "BACKFILL_CONCURRENCY", default_value_t = 1)]
    pub backfill_concurrency: usize,

    /// Compute embeddings without persisting them
    #[arg(long, env = "BACKFILL_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,
}

impl BackfillArgs {
    /// Converts flags into a validated [`BackfillConfig`].
    pub fn build(&self) -> Result<BackfillConfig, ConfigError> {
        let kinds = parse_kinds(&self.backfill_kinds)
            .map_err(|reason| ConfigError::new("backfill_kinds", reason))?;
        let config = BackfillConfig {
            batch_size: self.backfill_batch_size,
            kinds,
            rate_per_second: self.backfill_rate_per_second,
            concurrency: self.backfill_concurrency,
            dry_run: self.dry_run,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Datastore connection flags.
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Postgres connection string (postgres://...)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Schema holding the posts/answers/approaches tables.
    #[arg(long, env = "SEARCH_SCHEMA", default_value = "public")]
    pub schema: String,
}
