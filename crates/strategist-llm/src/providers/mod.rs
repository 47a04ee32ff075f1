pub mod anthropic;
pub mod openai;

use futures::future::BoxFuture;

use strategist_core::config::ModelConfig;
use strategist_core::error::Result;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

/// One-shot text completion against a provider's HTTP API.
pub trait CompletionClient: Send + Sync + 'static {
    fn complete(
        &self,
        config: &ModelConfig,
        system: Option<String>,
        prompt: String,
    ) -> BoxFuture<'_, Result<String>>;
}

/// Temperature is only sent when explicitly raised above zero.
pub(crate) fn effective_temperature(config: &ModelConfig) -> Option<f32> {
    (config.temperature > 0.0).then_some(config.temperature)
}
