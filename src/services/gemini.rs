use crate::errors::{AppError, AppResult};
use gemini_rust::Gemini;
use std::future::Future;

/// Anything that turns a prompt into generated text.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> impl Future<Output = AppResult<String>> + Send;
}

pub struct GeminiService {
    client: Gemini,
}

impl GeminiService {
    pub fn new(api_key: &str) -> AppResult<Self> {
        let client = Gemini::new(api_key.to_string())
            .map_err(|e| AppError::Other(format!("Failed to create Gemini client: {}", e)))?;

        Ok(Self { client })
    }
}

impl TextGenerator for GeminiService {
    async fn generate(&self, prompt: &str) -> AppResult<String> {
        tracing::info!("Sending request to Gemini API");

        let response = self
            .client
            .generate_content()
            .with_user_message(prompt)
            .execute()
            .await
            .map_err(|e| AppError::Generation(format!("Gemini API error: {}", e)))?;

        let response_text = response.text();
        tracing::info!("✅ Generated response from Gemini API ({} chars)", response_text.len());

        Ok(response_text)
    }
}
