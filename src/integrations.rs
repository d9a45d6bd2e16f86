use crate::{
    config::ImageApiConfig,
    domain::{GeneratedAsset, ImageGenerator, Thumbnailer},
    errors::IntegrationError,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Command;

#[derive(Serialize)]
struct GenerationRequest<'a> {
    prompt: &'a str,
    n: u8,
    size: &'a str,
    response_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenerationResponse {
    data: Vec<GenerationData>,
}

#[derive(Deserialize)]
struct GenerationData {
    b64_json: Option<String>,
}

/// Text-to-image API speaking the common `{prompt, n, size, response_format}` dialect.
#[derive(Debug, Clone)]
pub struct HttpImageGenerator {
    client: Client,
    config: ImageApiConfig,
}

impl HttpImageGenerator {
    pub fn new(config: ImageApiConfig) -> Result<Self, IntegrationError> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedAsset, IntegrationError> {
        tracing::debug!(url = %self.config.url, size = %self.config.size, "Requesting image generation");

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&GenerationRequest {
                prompt,
                n: 1,
                size: &self.config.size,
                response_format: "b64_json",
                model: self.config.model.as_deref(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Image API rejected generation request");
            return Err(IntegrationError::Upstream {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let payload: GenerationResponse = response.json().await?;
        let encoded = payload
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .ok_or_else(|| IntegrationError::MalformedResponse("no b64_json image in response".to_string()))?;
        let data = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| IntegrationError::MalformedResponse(format!("invalid base64 image: {}", e)))?;

        tracing::debug!(size = data.len(), "Image generated");
        Ok(GeneratedAsset {
            data,
            content_type: "image/png".to_string(),
        })
    }
}

/// Used when no image API is configured; every call fails with `NotConfigured`.
#[derive(Debug, Clone, Default)]
pub struct DisabledImageGenerator;

#[async_trait]
impl ImageGenerator for DisabledImageGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedAsset, IntegrationError> {
        Err(IntegrationError::NotConfigured("Image generation API"))
    }
}

/// Grabs one frame of a video with a local ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegThumbnailer {
    ffmpeg_path: String,
}

impl FfmpegThumbnailer {
    pub fn new(ffmpeg_path: String) -> Self {
        Self { ffmpeg_path }
    }
}

#[async_trait]
impl Thumbnailer for FfmpegThumbnailer {
    async fn thumbnail(&self, video: &[u8], extension: &str) -> Result<Vec<u8>, IntegrationError> {
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join(format!("input.{}", extension));
        let output = workdir.path().join("thumbnail.png");
        tokio::fs::write(&input, video).await?;

        let result = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(&input)
            .args(["-ss", "00:00:01", "-frames:v", "1", "-vf", "scale=320:-1"])
            .arg(&output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| IntegrationError::Thumbnail(format!("could not run '{}': {}", self.ffmpeg_path, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(IntegrationError::Thumbnail(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        // Videos shorter than the seek offset produce no frame.
        match tokio::fs::read(&output).await {
            Ok(png) if !png.is_empty() => Ok(png),
            Ok(_) => Err(IntegrationError::Thumbnail("ffmpeg produced an empty frame".to_string())),
            Err(e) => Err(IntegrationError::Thumbnail(format!("no frame extracted: {}", e))),
        }
    }
}
