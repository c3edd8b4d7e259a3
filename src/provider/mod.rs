pub mod client;
pub mod error;
pub mod selector;
pub mod types;

use async_trait::async_trait;

pub use client::HttpProvider;
pub use error::ProviderError;
pub use selector::ProviderSelector;
pub use types::{Generation, GenerationRequest};

/// A content-generation backend.
///
/// Implementations report whether a failure is transient or fatal; the
/// selector never infers it.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError>;
}
