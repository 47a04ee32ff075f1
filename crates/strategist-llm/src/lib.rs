pub mod providers;
pub mod retry;

use futures::future::BoxFuture;
use tracing::debug;

use strategist_core::config::{ModelConfig, ModelsConfig};
use strategist_core::error::Result;
use strategist_core::traits::LanguageModel;
use strategist_core::types::{GenerateRequest, ModelTier};

pub use providers::{AnthropicClient, CompletionClient, OpenAiClient};
pub use retry::RetryingClient;

/// Create a completion client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Box<dyn CompletionClient> {
    let client: Box<dyn CompletionClient> = match config.provider.as_str() {
        "anthropic" | "claude" => Box::new(AnthropicClient::new()),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiClient::new()),
    };

    match &config.retry {
        Some(retry) => Box::new(RetryingClient::new(client, retry.clone())),
        None => client,
    }
}

/// Routes generate requests to the cheap or deep model.
pub struct ModelRouter {
    cheap: (ModelConfig, Box<dyn CompletionClient>),
    deep: (ModelConfig, Box<dyn CompletionClient>),
}

impl ModelRouter {
    pub fn new(
        cheap: (ModelConfig, Box<dyn CompletionClient>),
        deep: (ModelConfig, Box<dyn CompletionClient>),
    ) -> Self {
        Self { cheap, deep }
    }

    pub fn from_config(models: &ModelsConfig) -> Self {
        Self::new(
            (models.cheap.clone(), create_client(&models.cheap)),
            (models.deep.clone(), create_client(&models.deep)),
        )
    }

    fn route(&self, tier: ModelTier) -> &(ModelConfig, Box<dyn CompletionClient>) {
        match tier {
            ModelTier::Cheap => &self.cheap,
            ModelTier::Deep => &self.deep,
        }
    }
}

impl LanguageModel for ModelRouter {
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let (config, client) = self.route(request.tier);
            debug!(
                tier = %request.tier,
                provider = %config.provider,
                model = %config.model_id,
                prompt_chars = request.prompt.len(),
                "Generating completion"
            );
            client
                .complete(config, request.system_prompt, request.prompt)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes the model id and prompt back.
    struct Echo;

    impl CompletionClient for Echo {
        fn complete(
            &self,
            config: &ModelConfig,
            system: Option<String>,
            prompt: String,
        ) -> BoxFuture<'_, Result<String>> {
            let model = config.model_id.clone();
            Box::pin(async move {
                Ok(format!("{}|{}|{}", model, system.unwrap_or_default(), prompt))
            })
        }
    }

    fn model(id: &str) -> ModelConfig {
        toml::from_str(&format!("model_id = \"{}\"", id)).unwrap()
    }

    #[tokio::test]
    async fn test_routes_by_tier() {
        let router = ModelRouter::new(
            (model("mini"), Box::new(Echo)),
            (model("large"), Box::new(Echo)),
        );

        let cheap = router
            .generate(GenerateRequest {
                prompt: "p".into(),
                tier: ModelTier::Cheap,
                system_prompt: None,
            })
            .await
            .unwrap();
        assert_eq!(cheap, "mini||p");

        let deep = router
            .generate(GenerateRequest {
                prompt: "q".into(),
                tier: ModelTier::Deep,
                system_prompt: Some("analyst".into()),
            })
            .await
            .unwrap();
        assert_eq!(deep, "large|analyst|q");
    }
}
