//! Title synchronization with the backend.
//!
//! Both calls are best-effort side effects: a failed fetch falls back to a
//! locally derived title, and a failed rename persist reverts the local
//! rename. Neither ever blocks the chat flow.

use crate::api::{RenameRequest, TitleResponse};
use crate::utils::url::construct_api_url;

/// Backend-generated title for a session, polled once after the first
/// successful exchange.
pub async fn fetch_title(
    client: &reqwest::Client,
    base_url: &str,
    session_id: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let url = construct_api_url(base_url, &format!("chat/{session_id}/title"));
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(format!("title fetch failed with status {}", response.status()).into());
    }

    let title: TitleResponse = response.json().await?;
    Ok(title.title)
}

/// Persist a user rename.
pub async fn persist_rename(
    client: &reqwest::Client,
    base_url: &str,
    session_id: &str,
    title: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = construct_api_url(base_url, &format!("chats/{session_id}"));
    let response = client
        .post(url)
        .json(&RenameRequest {
            title: title.to_string(),
        })
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("rename persist failed with status {}", response.status()).into());
    }
    Ok(())
}

/// Local fallback when the backend cannot supply a title: the first user
/// message, truncated.
pub fn derive_title(first_message: &str) -> String {
    const LIMIT: usize = 30;
    let trimmed = first_message.trim();
    if trimmed.chars().count() > LIMIT {
        let truncated: String = trimmed.chars().take(LIMIT).collect();
        format!("{truncated}...")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_title_truncates_long_messages() {
        assert_eq!(derive_title("short prompt"), "short prompt");

        let long = "explain the difference between borrowing and ownership";
        let derived = derive_title(long);
        assert_eq!(derived, "explain the difference between...");
        assert_eq!(derived.chars().count(), 33);
    }

    #[test]
    fn derive_title_counts_characters_not_bytes() {
        let accented = "é".repeat(31);
        assert_eq!(derive_title(&accented).chars().count(), 33);
    }
}
