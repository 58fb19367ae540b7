//! Registry of model adapters resolved at startup

use crate::agent::ModelAdapter;
use crate::config::Config;
use crate::error::{ChatllmError, Result};
use crate::providers::BackendKind;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const SUGGESTION_THRESHOLD: f64 = 0.7;

/// Maps backend names to their adapters
pub struct ModelRegistry {
    adapters: BTreeMap<BackendKind, Arc<ModelAdapter>>,
    default_kind: BackendKind,
}

impl ModelRegistry {
    /// Builds one adapter for every configured backend
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::Config` if the configuration is invalid or a
    /// provider cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let adapters = config
            .backends()
            .into_iter()
            .map(ModelAdapter::new)
            .collect::<Result<Vec<_>>>()?;
        let default_kind = config
            .chat
            .default_model
            .parse()
            .map_err(ChatllmError::Config)?;
        Self::from_adapters(adapters, default_kind)
    }

    /// Builds a registry from existing adapters
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::Config` when `default_kind` has no adapter
    pub fn from_adapters(adapters: Vec<ModelAdapter>, default_kind: BackendKind) -> Result<Self> {
        let adapters: BTreeMap<_, _> = adapters
            .into_iter()
            .map(|adapter| (adapter.kind(), Arc::new(adapter)))
            .collect();

        if !adapters.contains_key(&default_kind) {
            return Err(ChatllmError::Config(format!(
                "default model {} is not registered",
                default_kind
            ))
            .into());
        }

        tracing::debug!(
            "Registered {} model adapters, default {}",
            adapters.len(),
            default_kind
        );

        Ok(Self {
            adapters,
            default_kind,
        })
    }

    /// Looks up an adapter by name, case-insensitively
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::UnknownModel` when no adapter is registered
    /// under `name`
    pub fn get(&self, name: &str) -> Result<Arc<ModelAdapter>> {
        name.parse::<BackendKind>()
            .ok()
            .and_then(|kind| self.adapters.get(&kind))
            .cloned()
            .ok_or_else(|| {
                ChatllmError::UnknownModel {
                    name: name.to_string(),
                    available: self.names().join(", "),
                }
                .into()
            })
    }

    /// Adapter of the default backend
    pub fn default_adapter(&self) -> Result<Arc<ModelAdapter>> {
        self.get(self.default_kind.as_str())
    }

    /// Default backend
    pub fn default_kind(&self) -> BackendKind {
        self.default_kind
    }

    /// Registered backend names in registry order
    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.keys().map(|kind| kind.as_str()).collect()
    }

    /// Registered adapters in registry order
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<ModelAdapter>> {
        self.adapters.values()
    }

    /// Closest registered name to an unknown one, if any is close enough
    pub fn suggest(&self, unknown: &str) -> Option<&'static str> {
        let unknown = unknown.to_lowercase();
        let mut best_score = SUGGESTION_THRESHOLD;
        let mut best_match = None;

        for name in self.names() {
            let score = strsim::jaro_winkler(&unknown, name);
            if score > best_score {
                best_score = score;
                best_match = Some(name);
            }
        }

        best_match
    }

    /// Forgets a conversation in every adapter's pool
    pub fn forget_all(&self, conversation_id: &str) -> usize {
        self.adapters
            .values()
            .filter(|adapter| adapter.forget(conversation_id))
            .count()
    }

    /// Sweeps idle conversations from every adapter's pool
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        self.adapters
            .values()
            .map(|adapter| adapter.sweep_idle(now))
            .sum()
    }

    /// Starts a background task sweeping idle conversations every `interval`
    ///
    /// Returns `None` when `interval` is zero. The task runs until the
    /// returned handle is aborted or the runtime shuts down.
    pub fn spawn_idle_sweeper(
        registry: Arc<Self>,
        interval: Duration,
    ) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }

        tracing::info!(interval_secs = interval.as_secs(), "Starting idle conversation sweeper");
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = registry.sweep_idle(Utc::now());
                if removed > 0 {
                    tracing::debug!(removed, "Swept idle conversations");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ChatRequest;
    use crate::config::ModelConfig;
    use crate::test_utils::StaticProvider;

    fn registry() -> ModelRegistry {
        let adapters = [BackendKind::ChatGpt, BackendKind::Kimi]
            .into_iter()
            .map(|kind| {
                ModelAdapter::with_provider(
                    ModelConfig::with_api_key("k").resolve(kind, 30),
                    Arc::new(StaticProvider::new("ok")),
                )
            })
            .collect();
        ModelRegistry::from_adapters(adapters, BackendKind::ChatGpt).unwrap()
    }

    #[test]
    fn test_get_registered() {
        let registry = registry();
        assert_eq!(registry.get("kimi").unwrap().kind(), BackendKind::Kimi);
        assert_eq!(registry.get("ChatGPT").unwrap().kind(), BackendKind::ChatGpt);
        assert_eq!(registry.default_adapter().unwrap().kind(), BackendKind::ChatGpt);
        assert_eq!(registry.names(), vec!["chatgpt", "kimi"]);
    }

    #[test]
    fn test_get_unknown_model() {
        let registry = registry();
        for name in ["claude", "gemini"] {
            let err = registry.get(name).unwrap_err();
            match err.downcast_ref::<ChatllmError>() {
                Some(ChatllmError::UnknownModel { name: n, available }) => {
                    assert_eq!(n, name);
                    assert_eq!(available, "chatgpt, kimi");
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_default_must_be_registered() {
        let adapters = vec![ModelAdapter::with_provider(
            ModelConfig::with_api_key("k").resolve(BackendKind::Kimi, 30),
            Arc::new(StaticProvider::new("ok")),
        )];
        assert!(ModelRegistry::from_adapters(adapters, BackendKind::Claude).is_err());
    }

    #[test]
    fn test_suggest() {
        let registry = registry();
        assert_eq!(registry.suggest("chatgtp"), Some("chatgpt"));
        assert_eq!(registry.suggest("kim"), Some("kimi"));
        assert_eq!(registry.suggest("zzzzzz"), None);
    }

    #[tokio::test]
    async fn test_forget_all() {
        let registry = registry();
        for name in ["chatgpt", "kimi"] {
            registry
                .get(name)
                .unwrap()
                .generate_response(ChatRequest::new("shared", "hi"))
                .await
                .unwrap();
        }
        registry
            .get("kimi")
            .unwrap()
            .generate_response(ChatRequest::new("other", "hi"))
            .await
            .unwrap();

        assert_eq!(registry.forget_all("shared"), 2);
        assert_eq!(registry.forget_all("shared"), 0);
        assert!(registry.get("kimi").unwrap().pool().contains("other"));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        assert!(ModelRegistry::from_config(&Config::default()).is_err());
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.models.claude = Some(ModelConfig::with_api_key("k"));
        config.chat.default_model = "claude".to_string();
        let registry = ModelRegistry::from_config(&config).unwrap();
        assert_eq!(registry.default_kind(), BackendKind::Claude);
        assert_eq!(registry.names(), vec!["claude"]);
    }

    #[tokio::test]
    async fn test_idle_sweeper_disabled_for_zero_interval() {
        let registry = Arc::new(registry());
        assert!(ModelRegistry::spawn_idle_sweeper(registry, Duration::ZERO).is_none());
    }

    #[tokio::test]
    async fn test_idle_sweeper_removes_expired_conversations() {
        let mut model = ModelConfig::with_api_key("k");
        model.forget_time_ms = 1;
        let adapter = ModelAdapter::with_provider(
            model.resolve(BackendKind::Kimi, 30),
            Arc::new(StaticProvider::new("ok")),
        );
        let registry =
            Arc::new(ModelRegistry::from_adapters(vec![adapter], BackendKind::Kimi).unwrap());
        registry
            .default_adapter()
            .unwrap()
            .generate_response(ChatRequest::new("idle", "hi"))
            .await
            .unwrap();

        let handle =
            ModelRegistry::spawn_idle_sweeper(Arc::clone(&registry), Duration::from_millis(10))
                .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(!registry.default_adapter().unwrap().pool().contains("idle"));
    }
}
