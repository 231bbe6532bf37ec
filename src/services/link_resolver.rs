use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{LauncherError, Result};

const DEFAULT_API_BASE: &str = "https://api.gofile.io";
const FOLDER_MARKER: &str = "gofile.io/d/";
// Static token the hosting service expects alongside the guest session token.
const WEBSITE_TOKEN: &str = "4fd6sg89d7s6";
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of resolving an indirect hosting link. For direct links the URL is
/// passed through untouched and both `file_name` and `auth_token` stay empty.
#[derive(Clone, Debug)]
pub struct ResolvedLink {
    pub direct_url: String,
    pub file_name: Option<String>,
    pub auth_token: Option<String>,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    status: String,
    #[serde(default)]
    data: Value,
}

#[derive(Clone)]
pub struct LinkResolver {
    client: reqwest::Client,
    api_base: String,
}

impl LinkResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Resolves `url` into a directly fetchable file URL. URLs that do not
    /// match the hosting-service folder pattern pass through unchanged.
    pub async fn resolve(&self, url: &str) -> Result<ResolvedLink> {
        let Some(content_id) = extract_folder_id(url) else {
            return Ok(ResolvedLink {
                direct_url: url.to_string(),
                file_name: None,
                auth_token: None,
            });
        };

        tracing::info!("resolving indirect hosting link content_id={content_id}");

        let token = self.acquire_guest_token().await?;
        let data = self.fetch_folder_contents(&content_id, &token).await?;
        let (direct_url, file_name) = select_payload(&data)?;

        Ok(ResolvedLink {
            direct_url,
            file_name: Some(file_name),
            auth_token: Some(token),
        })
    }

    async fn acquire_guest_token(&self) -> Result<String> {
        let envelope: ApiEnvelope = self
            .client
            .post(format!("{}/accounts", self.api_base))
            .timeout(API_TIMEOUT)
            .send()
            .await?
            .json()
            .await?;

        if envelope.status != "ok" {
            return Err(LauncherError::LinkResolution(
                "guest account request rejected".to_string(),
            ));
        }
        envelope
            .data
            .get("token")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                LauncherError::LinkResolution("guest account response had no token".to_string())
            })
    }

    /// Queries folder contents. The primary endpoint is tried first; older
    /// API deployments answer on an alternate shape, so that is the fallback.
    async fn fetch_folder_contents(&self, content_id: &str, token: &str) -> Result<Value> {
        let primary = format!(
            "{}/contents/{}?wt={}",
            self.api_base, content_id, WEBSITE_TOKEN
        );
        let response = self
            .client
            .get(&primary)
            .timeout(API_TIMEOUT)
            .bearer_auth(token)
            .header("Cookie", format!("accountToken={token}"))
            .send()
            .await;

        if let Ok(response) = response {
            if let Ok(envelope) = response.json::<ApiEnvelope>().await {
                if envelope.status == "ok" {
                    return Ok(envelope.data);
                }
            }
        }

        let alternate = format!(
            "{}/getContent?contentId={}&token={}&wt={}",
            self.api_base, content_id, token, WEBSITE_TOKEN
        );
        let envelope: ApiEnvelope = self
            .client
            .get(&alternate)
            .timeout(API_TIMEOUT)
            .send()
            .await?
            .json()
            .await?;

        if envelope.status != "ok" {
            return Err(LauncherError::LinkResolution(
                "folder content request failed".to_string(),
            ));
        }
        Ok(envelope.data)
    }
}

/// Pulls the folder id out of a `gofile.io/d/<id>` style URL.
pub fn extract_folder_id(url: &str) -> Option<String> {
    let start = url.find(FOLDER_MARKER)? + FOLDER_MARKER.len();
    let id: String = url[start..]
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
        .collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Picks the largest `type == "file"` child as the payload. The listing comes
/// back either as an array or as an id-keyed object depending on the API
/// generation.
fn select_payload(data: &Value) -> Result<(String, String)> {
    let children = data
        .get("children")
        .or_else(|| data.get("contents"))
        .or_else(|| data.get("childs"))
        .ok_or_else(|| LauncherError::LinkResolution("no files found in folder".to_string()))?;

    let files: Vec<&Value> = match children {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    };

    let mut best: Option<&Value> = None;
    for file in &files {
        if file.get("type").and_then(Value::as_str) != Some("file") {
            continue;
        }
        let size = file.get("size").and_then(Value::as_u64).unwrap_or(0);
        let best_size = best
            .and_then(|b| b.get("size").and_then(Value::as_u64))
            .unwrap_or(0);
        // Ties keep the first-seen entry.
        if best.is_none() || size > best_size {
            best = Some(file);
        }
    }

    let best = best
        .ok_or_else(|| LauncherError::LinkResolution("no files found in folder".to_string()))?;

    let direct_url = best
        .get("link")
        .or_else(|| best.get("directLink"))
        .or_else(|| best.get("downloadUrl"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            LauncherError::LinkResolution("no direct download link available".to_string())
        })?;
    let file_name = best
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("download.zip");

    Ok((direct_url.to_string(), file_name.to_string()))
}
