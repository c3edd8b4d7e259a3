use std::sync::Arc;

use tracing::{info, warn};

use super::error::ProviderError;
use super::types::{Generation, GenerationRequest};
use super::ContentProvider;

/// Tries providers in configured preference order.
///
/// A transient failure falls through to the next provider; a fatal failure
/// stops the chain. Each provider is called at most once per `generate`.
#[derive(Clone)]
pub struct ProviderSelector {
    providers: Vec<Arc<dyn ContentProvider>>,
}

impl ProviderSelector {
    pub fn new(providers: Vec<Arc<dyn ContentProvider>>) -> Self {
        Self { providers }
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError> {
        let mut last = None;
        let mut attempted = 0;

        for provider in &self.providers {
            attempted += 1;
            match provider.generate(request).await {
                Ok(generation) => {
                    if attempted > 1 {
                        info!(provider = provider.name(), attempted, "fallback provider succeeded");
                    }
                    return Ok(generation);
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        provider = provider.name(),
                        error = %err,
                        "transient provider failure, falling back"
                    );
                    last = Some(err);
                }
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "fatal provider failure");
                    last = Some(err);
                    break;
                }
            }
        }

        match last {
            Some(err) => Err(ProviderError::Exhausted {
                attempted,
                last: Box::new(err),
            }),
            None => Err(ProviderError::NoProviders),
        }
    }
}
