// Shortsmith Uploader - YouTube resumable upload
//
// OAuth here is the offline flow: a long-lived refresh token from the
// environment is exchanged for a short-lived access token at upload time.
// The upload itself is the two step resumable protocol, with exponential
// backoff on the transient 5xx statuses YouTube is known to throw.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";
const MAX_RETRIES: u32 = 5;

/// Publishing metadata for a finished video.
#[derive(Debug, Clone)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub video_id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug)]
pub struct YouTubeUploader {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl YouTubeUploader {
    /// Build from YOUTUBE_CLIENT_ID / YOUTUBE_CLIENT_SECRET /
    /// YOUTUBE_REFRESH_TOKEN. Reports every missing variable at once.
    pub fn from_env() -> Result<Self> {
        let mut missing = Vec::new();
        let mut read = |key: &str| {
            std::env::var(key).unwrap_or_else(|_| {
                missing.push(key.to_string());
                String::new()
            })
        };
        let client_id = read("YOUTUBE_CLIENT_ID");
        let client_secret = read("YOUTUBE_CLIENT_SECRET");
        let refresh_token = read("YOUTUBE_REFRESH_TOKEN");
        if !missing.is_empty() {
            bail!("upload credentials missing: {}", missing.join(", "));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            refresh_token,
        })
    }

    async fn access_token(&self) -> Result<String> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("token refresh request failed")?;

        if !resp.status().is_success() {
            bail!("token refresh rejected: {}", resp.status());
        }
        let token: TokenResponse = resp.json().await.context("token response was not JSON")?;
        Ok(token.access_token)
    }

    async fn open_session(
        &self,
        token: &str,
        metadata: &VideoMetadata,
        privacy: &str,
        size: u64,
    ) -> Result<String> {
        let body = json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "tags": metadata.tags,
                "categoryId": "27",
            },
            "status": {
                "privacyStatus": privacy,
                "selfDeclaredMadeForKids": false,
            },
        });

        let resp = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", size.to_string())
            .json(&body)
            .send()
            .await
            .context("upload session request failed")?;

        if !resp.status().is_success() {
            bail!("upload session rejected: {}", resp.status());
        }
        resp.headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("upload session had no location header"))
    }

    /// Upload a finished video. Transient failures retry with 2^n second
    /// backoff; anything else aborts immediately.
    pub async fn upload(
        &self,
        video: &Path,
        metadata: &VideoMetadata,
        privacy: &str,
    ) -> Result<UploadResult> {
        let bytes = std::fs::read(video)
            .with_context(|| format!("could not read {:?}", video))?;
        info!(
            "[UPLOAD] '{}' ({} bytes, privacy {})",
            metadata.title,
            bytes.len(),
            privacy
        );

        let token = self.access_token().await?;
        let session = self
            .open_session(&token, metadata, privacy, bytes.len() as u64)
            .await?;

        let mut attempt = 0;
        loop {
            let outcome = self
                .http
                .put(&session)
                .bearer_auth(&token)
                .header("Content-Type", "video/mp4")
                .body(bytes.clone())
                .send()
                .await;

            match outcome {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: UploadResponse =
                        resp.json().await.context("upload response was not JSON")?;
                    let url = format!("https://youtube.com/shorts/{}", parsed.id);
                    info!("[UPLOAD] done: {}", url);
                    return Ok(UploadResult { video_id: parsed.id, url });
                }
                Ok(resp) if is_retriable(resp.status()) => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        bail!("upload failed after {} retries: {}", MAX_RETRIES, resp.status());
                    }
                    let wait = backoff_secs(attempt);
                    warn!(
                        "[UPLOAD] transient {} on attempt {}, retrying in {}s",
                        resp.status(),
                        attempt,
                        wait
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Ok(resp) => bail!("upload rejected: {}", resp.status()),
                Err(e) => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(e).context("upload failed after retries");
                    }
                    let wait = backoff_secs(attempt);
                    warn!("[UPLOAD] transport error on attempt {} ({e}), retrying in {}s", attempt, wait);
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
            }
        }
    }
}

fn is_retriable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 500 | 502 | 503 | 504)
}

fn backoff_secs(attempt: u32) -> u64 {
    2u64.pow(attempt)
}
