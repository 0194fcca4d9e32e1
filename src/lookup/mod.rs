//! Video lookup collaborator.
//!
//! Handlers only ever see requests that already passed the security
//! pipeline; this boundary turns a `ValidatedRequest` into metadata.
//!
//! # Design Decisions
//! - Async trait so backends that call out (extractors, caches) slot in
//! - `CanonicalUrlLookup` is pure: it maps platform + id to the platform's
//!   canonical URL without any network call

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::security::validation::{StreamMode, ValidatedRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoInfo {
    pub platform: String,
    pub video_id: String,
    pub source_url: String,
    pub quality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistInfo {
    pub platform: String,
    pub playlist_id: String,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDescriptor {
    pub platform: String,
    pub video_id: String,
    pub quality: String,
    pub mode: StreamMode,
    pub source_url: String,
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{platform}/{id} not found")]
    NotFound { platform: String, id: String },

    #[error("platform unavailable: {0}")]
    Unavailable(String),

    #[error("lookup failed: {0}")]
    Internal(String),
}

impl LookupError {
    pub fn status(&self) -> StatusCode {
        match self {
            LookupError::NotFound { .. } => StatusCode::NOT_FOUND,
            LookupError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LookupError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Metadata source for validated requests.
#[async_trait]
pub trait VideoLookup: Send + Sync {
    async fn video(&self, request: &ValidatedRequest) -> Result<VideoInfo, LookupError>;

    async fn playlist(&self, request: &ValidatedRequest) -> Result<PlaylistInfo, LookupError>;

    async fn stream(&self, request: &ValidatedRequest) -> Result<StreamDescriptor, LookupError>;
}

/// Resolves canonical source URLs for the built-in platforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalUrlLookup;

impl CanonicalUrlLookup {
    pub fn new() -> Self {
        Self
    }

    fn video_url(platform: &str, id: &str) -> Option<String> {
        let url = match platform {
            "youtube" => format!("https://www.youtube.com/watch?v={}", id),
            "vimeo" => format!("https://vimeo.com/{}", id),
            "dailymotion" => format!("https://www.dailymotion.com/video/{}", id),
            "twitch" => format!("https://www.twitch.tv/videos/{}", id),
            "soundcloud" => format!("https://soundcloud.com/{}", id),
            _ => return None,
        };
        Some(url)
    }

    fn playlist_url(platform: &str, id: &str) -> Option<String> {
        let url = match platform {
            "youtube" => format!("https://www.youtube.com/playlist?list={}", id),
            "vimeo" => format!("https://vimeo.com/showcase/{}", id),
            "dailymotion" => format!("https://www.dailymotion.com/playlist/{}", id),
            "twitch" => format!("https://www.twitch.tv/collections/{}", id),
            "soundcloud" => format!("https://soundcloud.com/sets/{}", id),
            _ => return None,
        };
        Some(url)
    }
}

fn required(request: &ValidatedRequest) -> Result<(&str, &str), LookupError> {
    match (request.platform.as_deref(), request.id.as_deref()) {
        (Some(platform), Some(id)) => Ok((platform, id)),
        _ => Err(LookupError::Internal(
            "validated request is missing platform or id".to_string(),
        )),
    }
}

#[async_trait]
impl VideoLookup for CanonicalUrlLookup {
    async fn video(&self, request: &ValidatedRequest) -> Result<VideoInfo, LookupError> {
        let (platform, id) = required(request)?;
        let source_url = Self::video_url(platform, id)
            .ok_or_else(|| LookupError::Unavailable(platform.to_string()))?;

        Ok(VideoInfo {
            platform: platform.to_string(),
            video_id: id.to_string(),
            source_url,
            quality: request.quality.clone(),
            country: request.country.clone(),
        })
    }

    async fn playlist(&self, request: &ValidatedRequest) -> Result<PlaylistInfo, LookupError> {
        let (platform, id) = required(request)?;
        let source_url = Self::playlist_url(platform, id)
            .ok_or_else(|| LookupError::Unavailable(platform.to_string()))?;

        Ok(PlaylistInfo {
            platform: platform.to_string(),
            playlist_id: id.to_string(),
            source_url,
        })
    }

    async fn stream(&self, request: &ValidatedRequest) -> Result<StreamDescriptor, LookupError> {
        let video = self.video(request).await?;
        Ok(StreamDescriptor {
            platform: video.platform,
            video_id: video.video_id,
            quality: video.quality,
            mode: request.mode,
            source_url: video.source_url,
        })
    }
}
