//! Erros de geração de conteúdo.
//!
//! A classificação entre transitório e fatal é feita pelo próprio provedor
//! ao construir o erro; o seletor apenas a consulta via
//! [`ProviderError::is_transient`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Timeout, rate limit ou indisponibilidade; vale tentar o próximo provedor.
    #[error("{provider}: transient failure: {reason}")]
    Transient { provider: String, reason: String },

    /// Erro que outro provedor não resolveria (ex.: requisição inválida).
    #[error("{provider}: fatal failure: {reason}")]
    Fatal { provider: String, reason: String },

    /// Todos os provedores da lista falharam.
    #[error("all providers failed after {attempted} attempt(s); last: {last}")]
    Exhausted {
        attempted: usize,
        last: Box<ProviderError>,
    },

    #[error("no providers configured")]
    NoProviders,
}

impl ProviderError {
    pub fn transient(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn fatal(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fatal {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }
}
