//! NIC: a chat service that answers nutrition questions with a hosted LLM,
//! grounding its replies in USDA FoodData Central lookups.

pub mod assistant;
pub mod chat;
pub mod config;
pub mod constants;
pub mod error;
pub mod extractor;
pub mod llm_interaction;
pub mod models;
pub mod nutrition;
pub mod prompt;
pub mod web_server;

pub use assistant::NutritionAssistant;
pub use config::Config;
pub use error::NicError;
pub use models::{ChatMessage, ChatReply, NutritionEntry, Role};
