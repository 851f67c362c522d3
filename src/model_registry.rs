use std::collections::BTreeMap;
use std::sync::Arc;

/// A logical model resolved to the upstream endpoint that serves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRoute<'a> {
    pub model: &'a str,
    pub endpoint: &'a str,
}

/// Fixed mapping from logical model ids to upstream endpoint paths.
///
/// Built once at startup and shared read-only across requests. The default
/// model is always present in the map, so resolution never fails.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    models: BTreeMap<String, String>,
    default_model: String,
}

impl ModelRegistry {
    /// Returns `None` when `default_model` has no entry in `models`.
    pub fn new(models: BTreeMap<String, String>, default_model: impl Into<String>) -> Option<Self> {
        let default_model = default_model.into();
        if !models.contains_key(&default_model) {
            return None;
        }
        Some(Self {
            inner: Arc::new(RegistryInner {
                models,
                default_model,
            }),
        })
    }

    pub fn resolve(&self, model_id: Option<&str>) -> ModelRoute<'_> {
        let inner = &*self.inner;
        if let Some((model, endpoint)) = model_id.and_then(|id| inner.models.get_key_value(id)) {
            return ModelRoute { model, endpoint };
        }
        ModelRoute {
            model: &inner.default_model,
            endpoint: &inner.models[&inner.default_model],
        }
    }

    pub fn default_model(&self) -> &str {
        &self.inner.default_model
    }

    /// Registered model ids in sorted order.
    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.inner.models.keys().map(String::as_str)
    }
}
