use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::error::ProviderError;
use super::types::{Generation, GenerationRequest, Message, MessagesRequest, MessagesResponse};
use super::ContentProvider;
use crate::config::ProviderConfig;

const SYSTEM_PROMPT: &str = "You are a professional content writer producing guest articles \
for publisher websites. Write an original, well-structured article in plain text. \
Reply with the article only.";

/// Messages-API compatible content provider.
pub struct HttpProvider {
    config: ProviderConfig,
    api_key: String,
    client: Client,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig, api_key: String) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ProviderError::fatal(&config.name, format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> MessagesRequest {
        let input = &request.input;
        let mut content = format!(
            "Write an article for publication on {domain}.\n\
             It must naturally include a link to {url} using the exact anchor text \"{anchor}\".",
            domain = input.publisher_domain.trim(),
            url = input.target_url.trim(),
            anchor = input.anchor_text.trim(),
        );
        if let Some(instructions) = &request.instructions {
            content.push_str("\n\n");
            content.push_str(instructions);
        }

        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![Message {
                role: "user".into(),
                content,
            }],
        }
    }

    fn cost_of(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (f64::from(input_tokens) * self.config.input_usd_per_mtok
            + f64::from(output_tokens) * self.config.output_usd_per_mtok)
            / 1_000_000.0
    }

    fn classify_transport(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ProviderError::transient(&self.config.name, format!("network error: {err}"))
        } else {
            ProviderError::fatal(&self.config.name, format!("network error: {err}"))
        }
    }
}

/// 408, 429, 5xx and the overloaded 529 are worth a fallback; other errors are not.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
        || status.as_u16() == 529
}

#[async_trait]
impl ContentProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError> {
        let body = self.build_request(request);
        debug!(provider = %self.config.name, model = %body.model, "sending generation request");

        let response = self
            .client
            .post(&self.config.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            return Err(ProviderError::transient(
                &self.config.name,
                format!("rate limited, retry after {retry_after}ms"),
            ));
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let reason = format!("API error (status {}): {message}", status.as_u16());
            return Err(if is_transient_status(status) {
                ProviderError::transient(&self.config.name, reason)
            } else {
                ProviderError::fatal(&self.config.name, reason)
            });
        }

        let body = response.json::<MessagesResponse>().await.map_err(|e| {
            ProviderError::fatal(&self.config.name, format!("failed to parse API response: {e}"))
        })?;

        let text = body.text();
        if text.trim().is_empty() {
            return Err(ProviderError::fatal(&self.config.name, "response contained no text"));
        }

        Ok(Generation {
            text,
            tokens_used: u64::from(body.usage.input_tokens) + u64::from(body.usage.output_tokens),
            cost_usd: self.cost_of(body.usage.input_tokens, body.usage.output_tokens),
            provider: self.config.name.clone(),
        })
    }
}
