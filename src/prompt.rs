use crate::constants::{NO_DATA_PLACEHOLDER, PERSONA_PROMPT};
use crate::models::{ChatMessage, NutritionEntry};

/// One line per entry: `item → name: value unit, ...`.
pub fn format_nutrition_summary(entries: &[NutritionEntry]) -> String {
    if entries.is_empty() {
        return NO_DATA_PLACEHOLDER.to_string();
    }
    entries
        .iter()
        .map(|entry| {
            let nutrients = entry
                .nutrients
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} → {}", entry.item, nutrients)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prepends the persona block and the nutrition summary to the caller's messages.
pub fn compose_messages(messages: &[ChatMessage], entries: &[NutritionEntry]) -> Vec<ChatMessage> {
    let mut composed = Vec::with_capacity(messages.len() + 2);
    composed.push(ChatMessage::system(PERSONA_PROMPT));
    composed.push(ChatMessage::system(format!(
        "Nutrition data:\n{}",
        format_nutrition_summary(entries)
    )));
    composed.extend_from_slice(messages);
    composed
}
