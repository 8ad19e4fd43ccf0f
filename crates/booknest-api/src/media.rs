//! Image hosting. Uploads and the poster gallery go through an [`ImageHost`];
//! production uses Cloudinary's signed upload and Admin APIs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use booknest_core::config::MediaConfig;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("image host is not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

/// A file received from a multipart request.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PosterPage {
    pub resources: Vec<String>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Stores the image and returns the host's JSON description of it.
    async fn upload(&self, upload: ImageUpload) -> Result<JsonValue, MediaError>;

    async fn list_posters(&self, next_cursor: Option<&str>) -> Result<PosterPage, MediaError>;
}

struct Credentials {
    cloud_name: String,
    api_key: String,
    api_secret: SecretString,
}

pub struct CloudinaryHost {
    client: reqwest::Client,
    api_base: String,
    folder: String,
    page_size: u32,
    credentials: Option<Credentials>,
}

impl CloudinaryHost {
    pub fn new(config: &MediaConfig) -> Self {
        let credentials = match (&config.cloud_name, &config.api_key, &config.api_secret) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(Credentials {
                cloud_name: cloud_name.clone(),
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
            }),
            _ => {
                info!("Cloudinary credentials missing; uploads will be rejected");
                None
            }
        };

        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            folder: config.folder.clone(),
            page_size: config.posters_page_size,
            credentials,
        }
    }

    fn credentials(&self) -> Result<&Credentials, MediaError> {
        self.credentials.as_ref().ok_or(MediaError::NotConfigured)
    }

    async fn read_json(response: reqwest::Response) -> Result<JsonValue, MediaError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

/// Cloudinary signature: `k1=v1&k2=v2...` sorted by key, with the secret
/// appended, hashed with SHA-256 and hex encoded.
pub fn sign_params(params: &BTreeMap<&str, String>, secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let digest = Sha256::digest(format!("{}{}", joined, secret).as_bytes());
    format!("{:x}", digest)
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, upload: ImageUpload) -> Result<JsonValue, MediaError> {
        let creds = self.credentials()?;
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let mut params = BTreeMap::new();
        params.insert("folder", self.folder.clone());
        params.insert("timestamp", timestamp.clone());
        let signature = sign_params(&params, creds.api_secret.expose_secret());

        let mut part = Part::bytes(upload.bytes).file_name(upload.file_name.clone());
        if let Some(mime) = &upload.content_type {
            part = part.mime_str(mime)?;
        }
        let form = Form::new()
            .part("file", part)
            .text("api_key", creds.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.folder.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let url = format!("{}/{}/image/upload", self.api_base, creds.cloud_name);
        debug!(file = %upload.file_name, "Uploading image");
        let response = self.client.post(url).multipart(form).send().await?;
        Self::read_json(response).await
    }

    async fn list_posters(&self, next_cursor: Option<&str>) -> Result<PosterPage, MediaError> {
        let creds = self.credentials()?;
        let url = format!("{}/{}/resources/image/upload", self.api_base, creds.cloud_name);

        let mut query = vec![
            ("prefix", format!("{}/", self.folder)),
            ("max_results", self.page_size.to_string()),
        ];
        if let Some(cursor) = next_cursor.filter(|c| !c.is_empty()) {
            query.push(("next_cursor", cursor.to_string()));
        }

        let response = self
            .client
            .get(url)
            .basic_auth(&creds.api_key, Some(creds.api_secret.expose_secret()))
            .query(&query)
            .send()
            .await?;
        let body = Self::read_json(response).await?;
        Ok(poster_page(&body))
    }
}

fn poster_page(body: &JsonValue) -> PosterPage {
    let resources = body["resources"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|r| r["secure_url"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    PosterPage {
        resources,
        next_cursor: body["next_cursor"].as_str().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_sorts_params_and_appends_secret() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1315060510".to_string());
        params.insert("folder", "bookposter".to_string());

        let expected = format!(
            "{:x}",
            Sha256::digest(b"folder=bookposter&timestamp=1315060510abcd")
        );
        assert_eq!(sign_params(&params, "abcd"), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn poster_page_keeps_secure_urls() {
        let body = json!({
            "resources": [
                {"secure_url": "https://res.example/a.jpg", "public_id": "a"},
                {"public_id": "no-url"},
                {"secure_url": "https://res.example/b.jpg"}
            ],
            "next_cursor": "abc123"
        });
        let page = poster_page(&body);
        assert_eq!(page.resources.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("abc123"));
        assert_eq!(poster_page(&json!({})), PosterPage::default());
    }

    #[tokio::test]
    async fn missing_credentials_are_reported() {
        let host = CloudinaryHost::new(&MediaConfig::default());
        assert!(matches!(
            host.list_posters(None).await,
            Err(MediaError::NotConfigured)
        ));
    }
}
