//! The request pipeline: extract foods, look them up, compose the prompt and
//! forward the conversation to the primary model.

use reqwest::Client;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::constants::{DIAGNOSTIC_PROMPT, TITLE_INSTRUCTION};
use crate::error::NicError;
use crate::extractor::extract_food_items;
use crate::llm_interaction::{CompletionClient, TokenStream};
use crate::models::{is_first_exchange, ChatMessage, ChatReply, NutritionEntry, Role};
use crate::nutrition::NutritionClient;
use crate::prompt::compose_messages;

pub struct NutritionAssistant {
    completions: CompletionClient,
    nutrition: NutritionClient,
    chat_model: String,
    aux_model: String,
}

/// A streamed reply and the title generated for it, if any.
pub struct StreamedReply {
    pub title: Option<String>,
    pub tokens: TokenStream,
}

impl NutritionAssistant {
    /// Builds the pipeline, failing before any network call when a secret is missing.
    pub fn from_config(config: &Config, http: Client) -> Result<Self, NicError> {
        let credentials = config.credentials()?;
        Ok(Self {
            completions: CompletionClient::new(
                http.clone(),
                &config.openai_base_url,
                &credentials.openai_api_key,
            ),
            nutrition: NutritionClient::new(http, &config.fdc_base_url, &credentials.fdc_api_key),
            chat_model: config.chat_model.clone(),
            aux_model: config.aux_model.clone(),
        })
    }

    /// Runs extraction and lookups, returning the prompt for the primary model.
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    pub async fn augment(&self, messages: &[ChatMessage]) -> Result<Vec<ChatMessage>, NicError> {
        let latest = messages
            .last()
            .ok_or_else(|| NicError::validation("`messages` must not be empty"))?;

        let items = extract_food_items(&self.completions, &self.aux_model, latest).await?;
        let entries: Vec<NutritionEntry> = self.nutrition.lookup_all(&items).await;
        info!(
            extracted = items.len(),
            matched = entries.len(),
            "Nutrition context assembled"
        );
        Ok(compose_messages(messages, &entries))
    }

    /// Full reply plus a title when `messages` opens a conversation.
    pub async fn reply(&self, messages: &[ChatMessage]) -> Result<ChatReply, NicError> {
        let prompt = self.augment(messages).await?;
        let message = self.completions.complete(&self.chat_model, &prompt).await?;
        let title = self.title_for(messages).await;
        Ok(ChatReply { title, message })
    }

    /// Same as [`reply`](Self::reply) but relays the primary model's tokens as they arrive.
    pub async fn reply_stream(&self, messages: &[ChatMessage]) -> Result<StreamedReply, NicError> {
        let prompt = self.augment(messages).await?;
        let title = self.title_for(messages).await;
        let tokens = self
            .completions
            .complete_stream(&self.chat_model, &prompt)
            .await?;
        Ok(StreamedReply { title, tokens })
    }

    /// One trivial completion to check the provider is reachable.
    pub async fn diagnose(&self) -> Result<String, NicError> {
        self.completions
            .complete(&self.chat_model, &[ChatMessage::user(DIAGNOSTIC_PROMPT)])
            .await
    }

    async fn title_for(&self, messages: &[ChatMessage]) -> Option<String> {
        if !is_first_exchange(messages) {
            return None;
        }
        let first = messages.iter().find(|m| m.role == Role::User)?;
        let prompt = [
            ChatMessage::system(TITLE_INSTRUCTION),
            ChatMessage::user(first.content.clone()),
        ];
        match self.completions.complete(&self.aux_model, &prompt).await {
            Ok(raw) => {
                let title = clean_title(&raw);
                (!title.is_empty()).then_some(title)
            }
            Err(e) => {
                warn!("Title generation failed, replying without one: {}", e);
                None
            }
        }
    }
}

/// Strips quotes and trailing punctuation and keeps at most five words.
pub fn clean_title(raw: &str) -> String {
    let first_line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut title = first_line.trim();
    // Wrappers can nest in any order, e.g. `"Title".` or `**"Title"**`
    loop {
        let stripped = title
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '*')
            .trim_end_matches(|c: char| c == '.' || c == '!' || c == ':')
            .trim();
        if stripped == title {
            break;
        }
        title = stripped;
    }
    title
        .split_whitespace()
        .take(5)
        .collect::<Vec<_>>()
        .join(" ")
}
