use crate::api::{ModelInfo, ModelsResponse};
use crate::utils::url::construct_api_url;

/// Fetch the backend's model catalog. Callers degrade to the configured
/// default model id when this fails; the error is surfaced but never fatal.
pub async fn fetch_models(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<Vec<ModelInfo>, Box<dyn std::error::Error>> {
    let models_url = construct_api_url(base_url, "models");
    let response = client.get(models_url).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("model listing failed with status {status}: {error_text}").into());
    }

    let models: ModelsResponse = response.json().await?;
    let mut data = models.data;
    sort_models(&mut data);
    Ok(data)
}

/// Group by provider, then alphabetically by display name within each
/// provider, matching how the catalog is presented.
pub fn sort_models(models: &mut [ModelInfo]) {
    models.sort_by(|a, b| {
        provider_label(&a.id)
            .cmp(&provider_label(&b.id))
            .then_with(|| display_name(a).cmp(display_name(b)))
    });
}

pub fn display_name(model: &ModelInfo) -> &str {
    model.name.as_deref().unwrap_or(&model.id)
}

/// Human-readable provider name from the `provider/model` id prefix.
pub fn provider_label(model_id: &str) -> String {
    let provider = model_id
        .split('/')
        .next()
        .unwrap_or("unknown")
        .to_ascii_lowercase();
    match provider.as_str() {
        "openai" => "OpenAI".to_string(),
        "anthropic" => "Anthropic".to_string(),
        "google" => "Google".to_string(),
        "meta-llama" => "Meta".to_string(),
        "microsoft" => "Microsoft".to_string(),
        "cohere" => "Cohere".to_string(),
        "mistralai" => "Mistral".to_string(),
        "perplexity" => "Perplexity".to_string(),
        "deepseek" => "DeepSeek".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => "Unknown".to_string(),
            }
        }
    }
}

/// Compact context-window size for the model listing.
pub fn format_context_length(context_length: u64) -> String {
    if context_length >= 1_000_000 {
        format!("{:.1}M", context_length as f64 / 1_000_000.0)
    } else if context_length >= 1_000 {
        format!("{}K", context_length / 1_000)
    } else {
        context_length.to_string()
    }
}

/// Whether the model accepts image input, per the catalog's architecture
/// block.
pub fn supports_vision(model: &ModelInfo) -> bool {
    model
        .architecture
        .as_ref()
        .map(|arch| arch.input_modalities.iter().any(|m| m == "image"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ModelArchitecture;

    fn model(id: &str, name: Option<&str>) -> ModelInfo {
        ModelInfo {
            id: id.to_string(),
            name: name.map(str::to_string),
            created: None,
            context_length: None,
            pricing: None,
            architecture: None,
        }
    }

    #[test]
    fn provider_labels_cover_known_and_unknown_prefixes() {
        assert_eq!(provider_label("openai/gpt-4o"), "OpenAI");
        assert_eq!(provider_label("meta-llama/llama-3.1-405b-instruct"), "Meta");
        assert_eq!(provider_label("qwen/qwen-2.5"), "Qwen");
        assert_eq!(provider_label("standalone-model"), "Standalone-model");
    }

    #[test]
    fn sort_groups_by_provider_then_name() {
        let mut models = vec![
            model("openai/gpt-4o", Some("GPT-4o")),
            model("anthropic/claude-3-haiku", Some("Claude 3 Haiku")),
            model("openai/gpt-3.5-turbo", Some("GPT-3.5 Turbo")),
        ];
        sort_models(&mut models);
        let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "anthropic/claude-3-haiku",
                "openai/gpt-3.5-turbo",
                "openai/gpt-4o"
            ]
        );
    }

    #[test]
    fn context_length_formatting() {
        assert_eq!(format_context_length(4096), "4K");
        assert_eq!(format_context_length(200_000), "200K");
        assert_eq!(format_context_length(1_050_000), "1.1M");
        assert_eq!(format_context_length(512), "512");
    }

    #[test]
    fn vision_support_reads_input_modalities() {
        let mut m = model("openai/gpt-4o", None);
        assert!(!supports_vision(&m));

        m.architecture = Some(ModelArchitecture {
            input_modalities: vec!["text".to_string(), "image".to_string()],
            output_modalities: vec!["text".to_string()],
        });
        assert!(supports_vision(&m));
    }
}
