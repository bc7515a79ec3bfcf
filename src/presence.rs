use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PresenceUpdate {
    pub online: usize,
    pub limit: usize,
    pub players: Vec<String>,
}

/// Pushes a roster summary to the configured webhook, if any. Fire and
/// forget; a failed update only costs a stale presence display.
pub fn refresh(webhook: Option<String>, update: PresenceUpdate) {
    let Some(url) = webhook else { return };
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        if let Err(err) = client.post(&url).json(&update).send().await {
            tracing::debug!(error = %err, "presence webhook update failed");
        }
    });
}
