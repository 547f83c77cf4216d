//! Layered configuration
//!
//! A setting is looked up in order: the value passed explicitly by the
//! caller, a scoped layer (per conversation or per run), a global layer
//! (usually the environment), then the built-in default. Resolution is a
//! plain function of its inputs; nothing is stored in globals.

use crate::client::GenerationParams;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub const MAX_STEPS: &str = "max_steps";
pub const CLIENT_TIMEOUT_MS: &str = "client_timeout_ms";
pub const CAPABILITY_TIMEOUT_MS: &str = "capability_timeout_ms";
pub const MODEL: &str = "model";
pub const TEMPERATURE: &str = "temperature";
pub const MAX_TOKENS: &str = "max_tokens";

const ENV_PREFIX: &str = "CONDUIT_";
const KEYS: [&str; 6] = [
    MAX_STEPS,
    CLIENT_TIMEOUT_MS,
    CAPABILITY_TIMEOUT_MS,
    MODEL,
    TEMPERATURE,
    MAX_TOKENS,
];

/// One layer of key/value settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigLayer {
    values: BTreeMap<String, Value>,
}

impl ConfigLayer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Typed lookup. A value of the wrong shape is treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, value = %value, error = %e, "Ignoring invalid config value");
                None
            }
        }
    }

    /// Global layer from `CONDUIT_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a layer by looking up `CONDUIT_<KEY>` for every known key.
    /// Values that parse as JSON keep their type; anything else is a string.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut layer = Self::new();
        for key in KEYS {
            let name = format!("{ENV_PREFIX}{}", key.to_uppercase());
            if let Some(raw) = lookup(&name) {
                let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                layer.set(key, value);
            }
        }
        layer
    }
}

/// First present value among explicit, scoped, global, else `default`
pub fn resolve<T: DeserializeOwned>(
    key: &str,
    explicit: Option<T>,
    scoped: Option<&ConfigLayer>,
    global: Option<&ConfigLayer>,
    default: T,
) -> T {
    explicit
        .or_else(|| scoped.and_then(|layer| layer.get(key)))
        .or_else(|| global.and_then(|layer| layer.get(key)))
        .unwrap_or(default)
}

/// Like `resolve` but with no default
pub fn resolve_optional<T: DeserializeOwned>(
    key: &str,
    explicit: Option<T>,
    scoped: Option<&ConfigLayer>,
    global: Option<&ConfigLayer>,
) -> Option<T> {
    explicit
        .or_else(|| scoped.and_then(|layer| layer.get(key)))
        .or_else(|| global.and_then(|layer| layer.get(key)))
}

/// Settings the engine runs with
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Transitions per `run` before giving up
    pub max_steps: usize,
    pub client_timeout: Duration,
    /// Per tool call
    pub capability_timeout: Duration,
    pub params: GenerationParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 16,
            client_timeout: Duration::from_secs(120),
            capability_timeout: Duration::from_secs(30),
            params: GenerationParams::default(),
        }
    }
}

impl EngineConfig {
    /// Resolve every engine setting through the cascade
    pub fn resolve(
        explicit: &ConfigLayer,
        scoped: Option<&ConfigLayer>,
        global: Option<&ConfigLayer>,
    ) -> Self {
        let defaults = Self::default();
        let ms = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);

        let max_steps = resolve(MAX_STEPS, explicit.get(MAX_STEPS), scoped, global, defaults.max_steps);
        let client_timeout_ms = resolve(
            CLIENT_TIMEOUT_MS,
            explicit.get(CLIENT_TIMEOUT_MS),
            scoped,
            global,
            ms(defaults.client_timeout),
        );
        let capability_timeout_ms = resolve(
            CAPABILITY_TIMEOUT_MS,
            explicit.get(CAPABILITY_TIMEOUT_MS),
            scoped,
            global,
            ms(defaults.capability_timeout),
        );

        Self {
            max_steps,
            client_timeout: Duration::from_millis(client_timeout_ms),
            capability_timeout: Duration::from_millis(capability_timeout_ms),
            params: GenerationParams {
                model: resolve_optional(MODEL, explicit.get(MODEL), scoped, global),
                temperature: resolve_optional(TEMPERATURE, explicit.get(TEMPERATURE), scoped, global),
                max_tokens: resolve_optional(MAX_TOKENS, explicit.get(MAX_TOKENS), scoped, global),
                extra: BTreeMap::new(),
            },
        }
    }
}
