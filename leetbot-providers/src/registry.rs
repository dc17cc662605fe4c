//! Provider registry - single source of truth for provider metadata

use serde::{Deserialize, Serialize};

/// One provider's metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub display_name: String,
    /// Conventional environment variable holding the API key
    pub env_key: String,
    pub default_api_base: String,
    pub default_model: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ProviderSpec {
    pub fn label(&self) -> String {
        if !self.display_name.is_empty() {
            self.display_name.clone()
        } else {
            self.name.clone()
        }
    }
}

/// Registry of known providers
pub struct ProviderRegistry {
    providers: Vec<ProviderSpec>,
}

impl ProviderRegistry {
    /// Create a registry with the bundled provider table
    pub fn new() -> Self {
        Self {
            providers: Self::default_providers(),
        }
    }

    /// Get all provider specs
    pub fn all(&self) -> &[ProviderSpec] {
        &self.providers
    }

    /// Find a provider by config name
    pub fn find_by_name(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers.iter().find(|spec| spec.name == name)
    }

    /// Find a provider by model name (case-insensitive keyword matching)
    pub fn find_by_model(&self, model: &str) -> Option<&ProviderSpec> {
        let model_lower = model.to_lowercase();
        self.providers
            .iter()
            .find(|spec| spec.keywords.iter().any(|kw| model_lower.contains(kw.as_str())))
    }

    fn default_providers() -> Vec<ProviderSpec> {
        let yaml = include_str!("providers.yaml");
        match serde_yaml::from_str(yaml) {
            Ok(providers) => providers,
            Err(e) => {
                tracing::error!("Bundled provider table is invalid: {}", e);
                Vec::new()
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
