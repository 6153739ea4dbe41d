//! Fetch → Generate → Publish → Deduct building blocks shared by the
//! queue processor and the synchronous generate endpoint.

use std::sync::Arc;

use crate::services::{
    fetcher::{FetchError, MediaFetcher},
    generation::{GenerationError, GenerationResult, ImageGenerator, InlineImage},
    job_store::StoreError,
    ledger::{CreditLedger, LedgerError},
    storage::{ResultPublisher, StorageError},
};

/// Whether the style prompt is sent verbatim or wrapped in the
/// identity-preserving instruction template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Literal,
    Wrapped,
}

/// A successfully generated image.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub fn wrap_prompt(style_description: &str) -> String {
    format!(
        "You are an expert artistic style transfer AI.\n\
         \n\
         TASK:\n\
         Transform the INPUT IMAGE to match the visual style described below.\n\
         \n\
         TARGET STYLE DESCRIPTION:\n\
         \"{style_description}\"\n\
         \n\
         INSTRUCTIONS:\n\
         1. Analyze the style description.\n\
         2. Apply these stylistic elements to the INPUT IMAGE.\n\
         3. CRITICAL: Maintain the identity, gender, pose, and main facial features of the subject from the INPUT IMAGE.\n\
         4. Output a high-quality, cohesive image."
    )
}

/// Any failure along the pipeline. The `Display` text is what gets stored
/// as a failed job's error message.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("insufficient credit: balance is {balance}")]
    InsufficientCredit { balance: i32 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("model refused to generate an image: {reason}")]
    Refused { reason: String },

    #[error("model returned no image")]
    EmptyResponse,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct StylePipeline {
    ledger: Arc<dyn CreditLedger>,
    generator: Arc<dyn ImageGenerator>,
    fetcher: MediaFetcher,
    publisher: ResultPublisher,
}

impl StylePipeline {
    pub fn new(
        ledger: Arc<dyn CreditLedger>,
        generator: Arc<dyn ImageGenerator>,
        fetcher: MediaFetcher,
        publisher: ResultPublisher,
    ) -> Self {
        Self {
            ledger,
            generator,
            fetcher,
            publisher,
        }
    }

    pub fn ledger(&self) -> &dyn CreditLedger {
        self.ledger.as_ref()
    }

    pub fn publisher(&self) -> &ResultPublisher {
        &self.publisher
    }

    /// Current balance, failing unless at least one credit is available.
    pub async fn ensure_credit(&self, user_id: &str) -> Result<i32, ProcessError> {
        let balance = self.ledger.balance(user_id).await?;
        if balance < 1 {
            return Err(ProcessError::InsufficientCredit { balance });
        }
        Ok(balance)
    }

    /// Download each input URL in order.
    pub async fn fetch_inputs<'a, I>(&self, urls: I) -> Result<Vec<InlineImage>, ProcessError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut images = Vec::new();
        for url in urls {
            let fetched = self.fetcher.fetch(url).await?;
            images.push(InlineImage {
                bytes: fetched.bytes,
                mime_type: fetched.content_type,
            });
        }
        Ok(images)
    }

    /// Run the model and insist on an image.
    pub async fn render(
        &self,
        prompt: &str,
        mode: PromptMode,
        images: &[InlineImage],
    ) -> Result<GeneratedImage, ProcessError> {
        let prompt = match mode {
            PromptMode::Literal => prompt.to_string(),
            PromptMode::Wrapped => wrap_prompt(prompt),
        };

        match self.generator.generate(&prompt, images).await? {
            GenerationResult::Image { bytes, mime_type } => Ok(GeneratedImage { bytes, mime_type }),
            GenerationResult::Refused { reason } => Err(ProcessError::Refused { reason }),
            GenerationResult::Empty => Err(ProcessError::EmptyResponse),
        }
    }
}
