//! Pulls food names out of the latest user message with an auxiliary model call.

use tracing::{debug, info, instrument};

use crate::constants::EXTRACTION_INSTRUCTION;
use crate::error::NicError;
use crate::llm_interaction::CompletionClient;
use crate::models::ChatMessage;

/// Asks `model` which foods `latest` mentions.
///
/// Only the request itself can fail; an unhelpful reply yields an empty list.
#[instrument(skip(client, latest))]
pub async fn extract_food_items(
    client: &CompletionClient,
    model: &str,
    latest: &ChatMessage,
) -> Result<Vec<String>, NicError> {
    let prompt = vec![
        ChatMessage::system(EXTRACTION_INSTRUCTION),
        ChatMessage::user(latest.content.clone()),
    ];
    debug!(message = %latest.content, "Extracting food items");

    let reply = client.complete(model, &prompt).await?;
    let items = parse_food_items(&reply);
    info!(?items, "Extracted food items");
    Ok(items)
}

/// Splits a comma-separated model reply into normalized food names.
pub fn parse_food_items(reply: &str) -> Vec<String> {
    let reply = reply.trim();
    if reply.eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    reply
        .split(',')
        .map(|s| s.trim().trim_end_matches('.').trim().to_lowercase())
        .filter(|s| !s.is_empty() && s != "none")
        .collect()
}
