use tracing::debug;

use crate::error::{GenrelayError, Result};
use crate::provider::ProviderDescriptor;
use crate::request::GenerationKind;

/// Ordered list of providers one job will try, first to last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderChain {
    kind: GenerationKind,
    providers: Vec<ProviderDescriptor>,
}

impl ProviderChain {
    pub fn kind(&self) -> GenerationKind {
        self.kind
    }

    pub fn get(&self, position: usize) -> Option<&ProviderDescriptor> {
        self.providers.get(position)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.iter()
    }

    /// Same chain, one attempt per provider.
    pub fn without_retries(mut self) -> Self {
        for provider in &mut self.providers {
            provider.max_retries = 0;
        }
        self
    }
}

/// Resolves fallback chains from the configured providers.
///
/// Order is fixed when the router is built: providers are sorted by priority
/// (lower first) and ties keep their declaration order. Nothing reorders the
/// chain at runtime.
#[derive(Debug, Clone, Default)]
pub struct ProviderRouter {
    providers: Vec<ProviderDescriptor>,
}

impl ProviderRouter {
    pub fn new(mut providers: Vec<ProviderDescriptor>) -> Self {
        // sort_by_key is stable
        providers.sort_by_key(|p| p.priority);
        Self { providers }
    }

    /// Every provider of `kind`, in chain order.
    pub fn chain(&self, kind: GenerationKind) -> Vec<&ProviderDescriptor> {
        self.providers.iter().filter(|p| p.kind == kind).collect()
    }

    /// The chain for one job. A hint moves that provider to the front; the
    /// rest keep their configured order.
    pub fn resolve(&self, kind: GenerationKind, hint: Option<&str>) -> Result<ProviderChain> {
        let mut providers: Vec<ProviderDescriptor> =
            self.chain(kind).into_iter().cloned().collect();
        if providers.is_empty() {
            return Err(GenrelayError::NoProviders(kind));
        }

        if let Some(hint) = hint {
            let pos = providers
                .iter()
                .position(|p| p.id == hint)
                .ok_or_else(|| GenrelayError::UnknownProvider {
                    id: hint.to_string(),
                    kind,
                })?;
            let hinted = providers.remove(pos);
            providers.insert(0, hinted);
            debug!(%kind, provider = hint, "provider hint applied");
        }

        Ok(ProviderChain { kind, providers })
    }

    /// A chain holding only provider `id`, whatever its kind.
    pub fn only(&self, id: &str) -> Result<ProviderChain> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| GenrelayError::ProviderNotConfigured(id.to_string()))?;
        Ok(ProviderChain {
            kind: provider.kind,
            providers: vec![provider.clone()],
        })
    }
}
