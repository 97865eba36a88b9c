//! Configuration management.
//!
//! [`StratacogConfig`] is the single read-only input the core receives at
//! startup: classifier thresholds, breaker parameters, per-layer retention
//! bounds, the pattern library, capability descriptors, provider wiring,
//! storage location, context budget, and logging options.
//!
//! Sources layer in precedence order: built-in defaults, then a TOML file
//! (mirrored through the `ConfigFile` structs), then `STRATACOG_*`
//! environment overrides.

use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::classifier::{ClassifierConfig, ComplexityClassifier};
use crate::coordinator::{
    CapabilityCoordinator, CapabilityRegistry, CoordinatorConfig, HttpCapabilityProvider,
    ProviderHttpConfig, StaticCapabilityProvider,
};
use crate::memory::RetentionPolicy;
use crate::models::{CapabilityDescriptor, Layer};
use crate::orchestrator::{DEFAULT_CONTEXT_BUDGET_CHARS, DecisionOrchestrator};
use crate::patterns::{DetectorConfig, PatternDetector, PatternLibrary, PatternSpec};
use crate::storage::StorageBackend;
use crate::{Error, Result};

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// Durable sqlite database.
    #[default]
    Sqlite,
    /// In-process map; nothing survives a restart.
    Memory,
}

impl StorageKind {
    /// Parses a backend name.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Self::Memory,
            _ => Self::Sqlite,
        }
    }
}

/// Durable storage configuration.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Which backend to run on.
    pub backend: StorageKind,
    /// Sqlite database path; `None` uses the default data directory.
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolves the sqlite database path.
    ///
    /// Falls back to `~/.local/share/stratacog/stratacog.db` (or the
    /// platform equivalent), then to a relative path when no home
    /// directory is available.
    #[must_use]
    pub fn resolved_db_path(&self) -> PathBuf {
        if let Some(path) = &self.db_path {
            return path.clone();
        }
        directories::BaseDirs::new().map_or_else(
            || PathBuf::from("stratacog.db"),
            |dirs| dirs.data_dir().join("stratacog").join("stratacog.db"),
        )
    }
}

/// Context aggregation configuration.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Layers aggregated into request context, in priority-tie order.
    pub layers: Vec<Layer>,
    /// Character budget for the aggregated blob.
    pub budget_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            layers: Layer::all().to_vec(),
            budget_chars: DEFAULT_CONTEXT_BUDGET_CHARS,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

impl LogFormat {
    /// Parses a format name.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging and metrics options.
#[derive(Debug, Clone, Default)]
pub struct LoggingSettings {
    /// Default filter directive when no `STRATACOG_LOG`/`RUST_LOG` is set.
    pub level: Option<String>,
    /// Output format.
    pub format: LogFormat,
    /// Prometheus exporter listen address, e.g. `127.0.0.1:9187`.
    /// `None` disables the exporter.
    pub metrics_listen: Option<String>,
}

/// How a configured provider is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// JSON-over-HTTP provider.
    Http,
    /// Fixed-payload provider, for offline wiring and demos.
    Static,
}

/// One configured capability provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSpec {
    /// Provider identifier, referenced by capability descriptors.
    pub id: String,
    /// Transport kind.
    pub kind: ProviderKind,
    /// Endpoint URL, required for `http` providers.
    pub endpoint: Option<String>,
    /// Fixed result payload, required for `static` providers.
    pub payload: Option<Value>,
}

/// Main configuration for stratacog.
#[derive(Debug, Clone, Default)]
pub struct StratacogConfig {
    /// Classifier tier thresholds.
    pub classifier: ClassifierConfig,
    /// Circuit breaker and call timeout parameters.
    pub coordinator: CoordinatorConfig,
    /// Per-layer retention bounds.
    pub retention: RetentionPolicy,
    /// Pattern detector thresholds.
    pub detector: DetectorConfig,
    /// Pattern specs overriding or extending the built-in library.
    pub patterns: Vec<PatternSpec>,
    /// Registered capability descriptors.
    pub capabilities: Vec<CapabilityDescriptor>,
    /// Configured capability providers.
    pub providers: Vec<ProviderSpec>,
    /// Durable storage location.
    pub storage: StorageConfig,
    /// Context aggregation settings.
    pub context: ContextConfig,
    /// Logging and metrics options.
    pub logging: LoggingSettings,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Classifier section.
    pub classifier: Option<ConfigFileClassifier>,
    /// Coordinator section.
    pub coordinator: Option<ConfigFileCoordinator>,
    /// Per-layer bounds, keyed by layer name.
    pub layers: Option<std::collections::HashMap<String, ConfigFileLayerBounds>>,
    /// Detector section.
    pub detector: Option<ConfigFileDetector>,
    /// Pattern library entries.
    pub patterns: Option<Vec<PatternSpec>>,
    /// Capability descriptors.
    pub capabilities: Option<Vec<ConfigFileCapability>>,
    /// Provider definitions.
    pub providers: Option<Vec<ProviderSpec>>,
    /// Storage section.
    pub storage: Option<ConfigFileStorage>,
    /// Context section.
    pub context: Option<ConfigFileContext>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Classifier section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileClassifier {
    /// Exclusive upper bound of the simple tier.
    pub simple_max: Option<f64>,
    /// Exclusive upper bound of the moderate tier.
    pub moderate_max: Option<f64>,
    /// Exclusive upper bound of the complex tier.
    pub complex_max: Option<f64>,
}

/// Coordinator section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCoordinator {
    /// Consecutive failures before a circuit opens.
    pub failure_threshold: Option<u32>,
    /// Open-circuit cooldown in milliseconds.
    pub cooldown_ms: Option<u64>,
    /// Hard per-call timeout in milliseconds.
    pub call_timeout_ms: Option<u64>,
}

/// One layer's bounds in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLayerBounds {
    /// Maximum live entries.
    pub max_entries: Option<usize>,
    /// Maximum entry age in milliseconds; 0 removes the age bound.
    pub max_age_ms: Option<u64>,
}

/// Detector section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDetector {
    /// Minimum reported confidence.
    pub min_confidence: Option<f64>,
    /// Maximum reported matches.
    pub max_matches: Option<usize>,
}

/// Capability descriptor in config file.
#[derive(Debug, Deserialize)]
pub struct ConfigFileCapability {
    /// Capability name.
    pub capability: String,
    /// Provider handling the capability.
    pub provider_id: String,
    /// Routing weight.
    pub weight: Option<f64>,
    /// Classifier signals the capability is relevant to.
    pub signals: Option<Vec<String>>,
}

/// Storage section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStorage {
    /// Backend name: `sqlite` or `memory`.
    pub backend: Option<String>,
    /// Sqlite database path.
    pub db_path: Option<String>,
}

/// Context section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileContext {
    /// Layer names to aggregate.
    pub layers: Option<Vec<String>>,
    /// Character budget.
    pub budget_chars: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Default filter directive.
    pub level: Option<String>,
    /// Output format: `pretty` or `json`.
    pub format: Option<String>,
    /// Prometheus exporter listen address.
    pub metrics_listen: Option<String>,
}

impl StratacogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed, or
    /// if a parsed value fails validation.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;

        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;

        let config = Self::from_config_file(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir first
    /// (`~/Library/Application Support/stratacog/` on macOS), then the
    /// XDG-style `~/.config/stratacog/` for Unix compatibility. Returns
    /// defaults when no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs
            .config_dir()
            .join("stratacog")
            .join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("stratacog")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Applies `STRATACOG_*` environment overrides.
    ///
    /// Covers classifier thresholds, breaker parameters, per-layer bounds,
    /// detector thresholds, storage backend/path, and the context budget.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_f64("STRATACOG_TIER_SIMPLE_MAX") {
            self.classifier.simple_max = v;
        }
        if let Some(v) = env_f64("STRATACOG_TIER_MODERATE_MAX") {
            self.classifier.moderate_max = v;
        }
        if let Some(v) = env_f64("STRATACOG_TIER_COMPLEX_MAX") {
            self.classifier.complex_max = v;
        }

        self.coordinator = self.coordinator.with_env_overrides();

        for layer in Layer::all().iter().copied() {
            let upper = layer.as_str().to_uppercase();
            let mut bounds = self.retention.bounds_for(layer);
            let mut touched = false;
            if let Some(v) = env_usize(&format!("STRATACOG_LAYER_{upper}_MAX_ENTRIES")) {
                bounds.max_entries = v.max(1);
                touched = true;
            }
            if let Some(v) = env_u64(&format!("STRATACOG_LAYER_{upper}_MAX_AGE_MS")) {
                bounds.max_age_ms = (v > 0).then_some(v);
                touched = true;
            }
            if touched {
                self.retention = self.retention.clone().with_layer_bounds(layer, bounds);
            }
        }

        if let Some(v) = env_f64("STRATACOG_PATTERN_MIN_CONFIDENCE") {
            self.detector.min_confidence = v;
        }
        if let Some(v) = env_usize("STRATACOG_PATTERN_MAX_MATCHES") {
            self.detector.max_matches = v;
        }

        if let Ok(v) = std::env::var("STRATACOG_STORAGE_BACKEND") {
            self.storage.backend = StorageKind::parse(&v);
        }
        if let Ok(v) = std::env::var("STRATACOG_DB_PATH") {
            if !v.trim().is_empty() {
                self.storage.db_path = Some(PathBuf::from(v));
            }
        }

        if let Some(v) = env_usize("STRATACOG_CONTEXT_BUDGET_CHARS") {
            self.context.budget_chars = v;
        }

        self
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unusable thresholds or an incomplete
    /// provider definition.
    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return Err(Error::Config(format!(
                "detector min_confidence must be within [0, 1], got {}",
                self.detector.min_confidence
            )));
        }
        if self.context.budget_chars == 0 {
            return Err(Error::Config(
                "context budget_chars must be positive".to_string(),
            ));
        }
        for provider in &self.providers {
            match provider.kind {
                ProviderKind::Http if provider.endpoint.is_none() => {
                    return Err(Error::Config(format!(
                        "http provider '{}' needs an endpoint",
                        provider.id
                    )));
                },
                ProviderKind::Static if provider.payload.is_none() => {
                    return Err(Error::Config(format!(
                        "static provider '{}' needs a payload",
                        provider.id
                    )));
                },
                _ => {},
            }
        }
        Ok(())
    }

    /// Compiles the pattern library with configured overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid pattern spec.
    pub fn pattern_library(&self) -> Result<PatternLibrary> {
        PatternLibrary::with_overrides(&self.patterns)
    }

    /// Builds the provider registry from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an incomplete provider definition.
    pub fn build_registry(&self) -> Result<CapabilityRegistry> {
        let mut registry = CapabilityRegistry::new();
        let http_config =
            ProviderHttpConfig::from_env().with_timeout_ms(self.coordinator.call_timeout_ms);

        for spec in &self.providers {
            match spec.kind {
                ProviderKind::Http => {
                    let endpoint = spec.endpoint.as_ref().ok_or_else(|| {
                        Error::Config(format!("http provider '{}' needs an endpoint", spec.id))
                    })?;
                    registry.register_provider(Arc::new(
                        HttpCapabilityProvider::new(&spec.id, endpoint)
                            .with_http_config(http_config),
                    ));
                },
                ProviderKind::Static => {
                    let payload = spec.payload.clone().ok_or_else(|| {
                        Error::Config(format!("static provider '{}' needs a payload", spec.id))
                    })?;
                    registry.register_provider(Arc::new(StaticCapabilityProvider::new(
                        &spec.id, payload,
                    )));
                },
            }
        }

        for descriptor in &self.capabilities {
            if !registry.provider_ids().contains(&descriptor.provider_id) {
                tracing::warn!(
                    capability = %descriptor.capability,
                    provider = %descriptor.provider_id,
                    "Capability descriptor references an unconfigured provider"
                );
            }
            registry.add_descriptor(descriptor.clone());
        }
        Ok(registry)
    }

    /// Assembles a [`DecisionOrchestrator`] over the given backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a configured pattern or provider is
    /// invalid.
    pub fn build_orchestrator<B: StorageBackend>(
        &self,
        backend: Arc<B>,
    ) -> Result<DecisionOrchestrator<B>> {
        let classifier = ComplexityClassifier::new(self.classifier, self.capabilities.clone());
        let detector = PatternDetector::new(self.pattern_library()?, self.detector);
        let coordinator =
            CapabilityCoordinator::new(self.build_registry()?, self.coordinator.clone());

        Ok(DecisionOrchestrator::new(
            backend,
            self.retention.clone(),
            classifier,
            detector,
            coordinator,
        )
        .with_context_layers(self.context.layers.clone())
        .with_context_budget(self.context.budget_chars))
    }

    /// Converts a `ConfigFile` to `StratacogConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(classifier) = file.classifier {
            if let Some(v) = classifier.simple_max {
                config.classifier.simple_max = v;
            }
            if let Some(v) = classifier.moderate_max {
                config.classifier.moderate_max = v;
            }
            if let Some(v) = classifier.complex_max {
                config.classifier.complex_max = v;
            }
        }

        if let Some(coordinator) = file.coordinator {
            if let Some(v) = coordinator.failure_threshold {
                config.coordinator.failure_threshold = v.max(1);
            }
            if let Some(v) = coordinator.cooldown_ms {
                config.coordinator.cooldown_ms = v;
            }
            if let Some(v) = coordinator.call_timeout_ms {
                config.coordinator.call_timeout_ms = v;
            }
        }

        if let Some(layers) = file.layers {
            for (name, file_bounds) in layers {
                let layer =
                    Layer::from_name(&name).map_err(|e| Error::Config(e.to_string()))?;
                let mut bounds = config.retention.bounds_for(layer);
                if let Some(v) = file_bounds.max_entries {
                    bounds.max_entries = v.max(1);
                }
                if let Some(v) = file_bounds.max_age_ms {
                    bounds.max_age_ms = (v > 0).then_some(v);
                }
                config.retention = config.retention.clone().with_layer_bounds(layer, bounds);
            }
        }

        if let Some(detector) = file.detector {
            if let Some(v) = detector.min_confidence {
                config.detector.min_confidence = v;
            }
            if let Some(v) = detector.max_matches {
                config.detector.max_matches = v;
            }
        }

        if let Some(patterns) = file.patterns {
            config.patterns = patterns;
        }

        if let Some(capabilities) = file.capabilities {
            config.capabilities = capabilities
                .into_iter()
                .map(|c| CapabilityDescriptor {
                    capability: c.capability,
                    provider_id: c.provider_id,
                    weight: c.weight.unwrap_or(1.0),
                    signals: c.signals.unwrap_or_default(),
                })
                .collect();
        }

        if let Some(providers) = file.providers {
            config.providers = providers;
        }

        if let Some(storage) = file.storage {
            if let Some(backend) = storage.backend {
                config.storage.backend = StorageKind::parse(&backend);
            }
            if let Some(path) = storage.db_path {
                config.storage.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(context) = file.context {
            if let Some(names) = context.layers {
                let mut layers = Vec::with_capacity(names.len());
                for name in names {
                    layers
                        .push(Layer::from_name(&name).map_err(|e| Error::Config(e.to_string()))?);
                }
                config.context.layers = layers;
            }
            if let Some(v) = context.budget_chars {
                config.context.budget_chars = v;
            }
        }

        if let Some(logging) = file.logging {
            config.logging.level = logging.level;
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
            config.logging.metrics_listen = logging.metrics_listen;
        }

        Ok(config)
    }
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.parse().ok()
}
