//! Runtime configuration for the chat service.

use crate::constants;
use crate::error::NicError;

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub fdc_api_key: Option<String>,
    pub openai_base_url: String,
    pub fdc_base_url: String,
    pub chat_model: String,
    pub aux_model: String,
    pub expose_error_details: bool,
}

/// Both secrets, only obtainable once they are known to be present.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub fdc_api_key: String,
}

impl Config {
    /// Reads secrets from `OPENAI_API_KEY` / `FDC_API_KEY` and the rest from `constants`.
    pub fn from_env() -> Self {
        Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            fdc_api_key: non_empty_var("FDC_API_KEY"),
            openai_base_url: constants::OPENAI_BASE_URL.clone(),
            fdc_base_url: constants::FDC_BASE_URL.clone(),
            chat_model: constants::NIC_CHAT_MODEL.clone(),
            aux_model: constants::NIC_AUX_MODEL.clone(),
            expose_error_details: true,
        }
    }

    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.fdc_api_key.is_none() {
            missing.push("FDC_API_KEY");
        }
        missing
    }

    pub fn credentials(&self) -> Result<Credentials, NicError> {
        match (&self.openai_api_key, &self.fdc_api_key) {
            (Some(openai), Some(fdc)) => Ok(Credentials {
                openai_api_key: openai.clone(),
                fdc_api_key: fdc.clone(),
            }),
            _ => Err(NicError::Configuration(format!(
                "missing credentials: {}",
                self.missing_credentials().join(", ")
            ))),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
