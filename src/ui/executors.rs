//! Spawned side-effect tasks.
//!
//! Each executor runs one network call off the event loop and reports back
//! over the side-effect channel; the loop applies the result to the state.
//! Nothing here touches the stores directly.

use tokio::sync::mpsc::UnboundedSender;

use crate::api::models::fetch_models;
use crate::api::titles::{fetch_title, persist_rename};
use crate::api::ModelInfo;
use crate::core::store::SessionId;

#[derive(Debug)]
pub enum SideEffect {
    ModelsLoaded {
        result: Result<Vec<ModelInfo>, String>,
    },
    TitleFetched {
        session: SessionId,
        result: Result<String, String>,
    },
    RenamePersisted {
        session: SessionId,
        previous_title: String,
        error: Option<String>,
    },
}

pub fn spawn_models_loader(
    client: reqwest::Client,
    base_url: String,
    tx: UnboundedSender<SideEffect>,
) {
    tokio::spawn(async move {
        let result = fetch_models(&client, &base_url)
            .await
            .map_err(|e| e.to_string());
        let _ = tx.send(SideEffect::ModelsLoaded { result });
    });
}

/// One-shot title poll after a session's first completed exchange.
pub fn spawn_title_refresh(
    client: reqwest::Client,
    base_url: String,
    session: SessionId,
    tx: UnboundedSender<SideEffect>,
) {
    tokio::spawn(async move {
        let result = fetch_title(&client, &base_url, &session.to_string())
            .await
            .map_err(|e| e.to_string());
        let _ = tx.send(SideEffect::TitleFetched { session, result });
    });
}

/// Push a local rename to the backend; the previous title rides along so
/// the loop can revert on failure.
pub fn spawn_rename_persist(
    client: reqwest::Client,
    base_url: String,
    session: SessionId,
    title: String,
    previous_title: String,
    tx: UnboundedSender<SideEffect>,
) {
    tokio::spawn(async move {
        let error = persist_rename(&client, &base_url, &session.to_string(), &title)
            .await
            .err()
            .map(|e| e.to_string());
        let _ = tx.send(SideEffect::RenamePersisted {
            session,
            previous_title,
            error,
        });
    });
}
