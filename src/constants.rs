// Endpoints, model names and prompt text, overridable from the environment where it makes sense.

use std::env;

lazy_static::lazy_static! {
    pub static ref OPENAI_BASE_URL: String = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    pub static ref FDC_BASE_URL: String = env::var("FDC_BASE_URL").unwrap_or_else(|_| "https://api.nal.usda.gov/fdc/v1".to_string());
    // Model answering the user
    pub static ref NIC_CHAT_MODEL: String = env::var("NIC_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    // Model used for food extraction and titles
    pub static ref NIC_AUX_MODEL: String = env::var("NIC_AUX_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
}

/// Upper bound on the number of messages accepted in a single chat request.
pub const MAX_MESSAGES: usize = 50;

/// Nutrients kept from the first matching food record.
pub const MAX_NUTRIENTS: usize = 5;

pub const DEFAULT_PORT: u16 = 9900;

pub const NO_DATA_PLACEHOLDER: &str = "No data found for input foods.";

pub const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";

pub const TITLE_HEADER: &str = "x-conversation-title";

pub const EXTRACTION_INSTRUCTION: &str = "Extract the food items mentioned in the following message. \
Reply with the food names only, comma-separated, without quantities or any other text. \
If the message mentions no food, reply with: none";

pub const TITLE_INSTRUCTION: &str = "Generate a short title of 3 to 5 words for a conversation \
that starts with the following message. Reply with the title only, without quotes or punctuation.";

pub const PERSONA_PROMPT: &str = "You are NIC, a friendly nutrition assistant. \
Answer questions about food, diet and nutrients clearly and concisely. \
When nutrition data is provided below, base your numbers on it and mention the serving basis if known. \
When no data is available, give general guidance and say that exact values could not be looked up. \
You do not give medical diagnoses; suggest consulting a professional for medical concerns.";

pub const DIAGNOSTIC_PROMPT: &str = "Say hello";
