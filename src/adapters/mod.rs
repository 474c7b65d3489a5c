pub mod analyzer;
pub mod gemini;
pub mod groq;
pub mod refiner;
pub mod structured_output;

use crate::errors::AppResult;
use crate::models::ImageUpload;
use async_trait::async_trait;

pub use analyzer::Analyzer;
pub use refiner::Refiner;

#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub image: Option<ImageUpload>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: Option<ImageUpload>) -> Self {
        self.image = image;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = Some(temperature);
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A hosted text model. Implementations return the raw reply text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, request: ModelRequest) -> AppResult<String>;
}
