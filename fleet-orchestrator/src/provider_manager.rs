use crate::error::FleetError;
use crate::settings::Settings;
use fleet_providers::CloudProvider;
use std::sync::Arc;

/// Explicit set of providers available to this process.
///
/// Built once by the entry point and passed to the inventory builder and the
/// cluster operations. Iteration follows registration order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn CloudProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider`, replacing any earlier provider with the same name.
    pub fn register(&mut self, provider: Arc<dyn CloudProvider>) {
        self.providers.retain(|p| p.name() != provider.name());
        self.providers.push(provider);
    }

    pub fn with(mut self, provider: Arc<dyn CloudProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CloudProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    pub fn providers(&self) -> &[Arc<dyn CloudProvider>] {
        &self.providers
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.iter().map(|p| p.name().to_string()).collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Resolve `names` in the given order, dropping repeats.
    pub fn select(&self, names: &[String]) -> Result<Vec<Arc<dyn CloudProvider>>, FleetError> {
        let mut out: Vec<Arc<dyn CloudProvider>> = Vec::with_capacity(names.len());
        for name in names {
            if out.iter().any(|p| p.name() == name) {
                continue;
            }
            let provider = self
                .get(name)
                .ok_or_else(|| FleetError::UnknownProvider(name.clone()))?;
            out.push(provider);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

pub struct ProviderManager;

impl ProviderManager {
    /// Probe every compiled-in provider and register the available ones.
    ///
    /// When `settings.providers` is non-empty only those providers are considered.
    pub fn from_settings(settings: &Settings) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for name in Self::candidates(settings) {
            match Self::get_provider(&name, settings) {
                Some(provider) => {
                    tracing::debug!(provider = %name, "provider registered");
                    registry.register(provider);
                }
                None => tracing::info!(provider = %name, "provider unavailable, skipping"),
            }
        }
        registry
    }

    fn candidates(settings: &Settings) -> Vec<String> {
        if !settings.providers.is_empty() {
            return settings.providers.clone();
        }
        let mut all = Vec::new();
        if cfg!(feature = "provider-gce") {
            all.push("gce".to_string());
        }
        all
    }

    pub fn get_provider(provider_name: &str, settings: &Settings) -> Option<Arc<dyn CloudProvider>> {
        match provider_name.to_lowercase().as_str() {
            #[cfg(feature = "provider-gce")]
            "gce" => {
                let opts = fleet_providers::gce::GceOptions {
                    project: settings.gce_project.clone(),
                    service_account: settings.gce_service_account.clone(),
                    machine_type: settings.gce_machine_type.clone(),
                    zones: settings.gce_zones.clone(),
                    remote_user: settings.ssh_user.clone(),
                    email_domain: settings.email_domain.clone(),
                };
                fleet_providers::gce::probe(opts).map(|p| Arc::new(p) as Arc<dyn CloudProvider>)
            }
            #[cfg(feature = "provider-mock")]
            "mock" => {
                let _ = settings; // in-memory, nothing to configure
                Some(Arc::new(fleet_providers::mock::MockProvider::new("mock")))
            }
            // Add other providers here:
            // "aws" => ...
            _ => {
                let _ = settings;
                None
            }
        }
    }
}
