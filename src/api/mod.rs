use serde::{Deserialize, Serialize};

/// Body of a plain-text send. Uploads use a multipart form instead; see the
/// generation module.
#[derive(Serialize, Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub model: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ModelPricing {
    pub prompt: Option<String>,
    pub completion: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ModelArchitecture {
    #[serde(default)]
    pub input_modalities: Vec<String>,
    #[serde(default)]
    pub output_modalities: Vec<String>,
}

/// One entry of the backend's model catalog (OpenRouter shape).
#[derive(Deserialize, Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub name: Option<String>,
    pub created: Option<u64>,
    pub context_length: Option<u64>,
    pub pricing: Option<ModelPricing>,
    pub architecture: Option<ModelArchitecture>,
}

#[derive(Deserialize, Debug)]
pub struct ModelsResponse {
    pub data: Vec<ModelInfo>,
}

#[derive(Deserialize, Debug)]
pub struct TitleResponse {
    pub title: String,
}

#[derive(Serialize, Debug)]
pub struct RenameRequest {
    pub title: String,
}

pub mod models;
pub mod titles;
