use crate::constants::{UPLOAD_COMPLETE_PATH, UPLOAD_TARGET_PATH};
use crate::error::{PipelineError, Result};
use crate::media::MediaFile;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

const ERROR_BODY_LIMIT: usize = 300;

/// What an uploaded file will be used for on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadIntent {
    Highlight,
    ProfilePicture,
    TeamLogo,
}

impl UploadIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadIntent::Highlight => "highlight",
            UploadIntent::ProfilePicture => "profile_picture",
            UploadIntent::TeamLogo => "team_logo",
        }
    }
}

impl fmt::Display for UploadIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UploadIntent {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "highlight" => Ok(UploadIntent::Highlight),
            "profile_picture" => Ok(UploadIntent::ProfilePicture),
            "team_logo" => Ok(UploadIntent::TeamLogo),
            _ => Err(PipelineError::UnsupportedIntent(s.to_string())),
        }
    }
}

/// A presigned destination returned by the storage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub upload_endpoint: String,
    #[serde(default)]
    pub required_form_fields: BTreeMap<String, String>,
    pub final_file_url: String,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUpload {
    pub final_file_url: String,
}

/// Object storage reached through a presigned-upload handshake.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn request_upload_target(
        &self,
        file_name: &str,
        content_type: &str,
        intent: UploadIntent,
    ) -> Result<UploadTarget>;

    /// Posts the file as multipart form data. The form fields required by the
    /// target come first and the file field last.
    async fn submit_to_upload_endpoint(&self, target: &UploadTarget, file: &MediaFile) -> Result<()>;
}

/// The application backend that records finished uploads.
#[async_trait]
pub trait BackendRegistry: Send + Sync {
    async fn notify_upload_complete(
        &self,
        storage_key: &str,
        intent: UploadIntent,
    ) -> Result<RegisteredUpload>;
}

#[derive(Debug, Serialize)]
struct UploadTargetRequest<'a> {
    file_name: &'a str,
    content_type: &'a str,
    upload_intent: UploadIntent,
}

#[derive(Debug, Serialize)]
struct UploadCompleteRequest<'a> {
    storage_key: &'a str,
    upload_intent: UploadIntent,
}

/// reqwest-backed client for both the storage handshake and the backend.
#[derive(Debug, Clone)]
pub struct HttpUploadClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpUploadClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        build_endpoint_url(&self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Joins a base URL and a path without doubling or dropping the slash
pub fn build_endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn transport_error(context: &str) -> impl FnOnce(reqwest::Error) -> PipelineError + '_ {
    move |e| PipelineError::UploadTransport(format!("{}: {}", context, e))
}

async fn ensure_success(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    Err(PipelineError::UploadTransport(format!(
        "{} returned {}: {}",
        context,
        status,
        detail.trim()
    )))
}

#[async_trait]
impl StorageService for HttpUploadClient {
    async fn request_upload_target(
        &self,
        file_name: &str,
        content_type: &str,
        intent: UploadIntent,
    ) -> Result<UploadTarget> {
        let context = "upload target request";
        let request = self
            .client
            .post(self.endpoint(UPLOAD_TARGET_PATH))
            .json(&UploadTargetRequest {
                file_name,
                content_type,
                upload_intent: intent,
            });
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error(context))?;
        let target: UploadTarget = ensure_success(response, context)
            .await?
            .json()
            .await
            .map_err(transport_error(context))?;
        debug!("Upload target for {}: {}", file_name, target.storage_key);
        Ok(target)
    }

    async fn submit_to_upload_endpoint(&self, target: &UploadTarget, file: &MediaFile) -> Result<()> {
        let context = "storage upload";
        let mut form = Form::new();
        for (name, value) in &target.required_form_fields {
            form = form.text(name.clone(), value.clone());
        }
        let part = Part::bytes(file.data.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(transport_error(context))?;
        form = form.part("file", part);

        let response = self
            .client
            .post(&target.upload_endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error(context))?;
        ensure_success(response, context).await?;
        info!("Uploaded {} to {}", file.name, target.storage_key);
        Ok(())
    }
}

#[async_trait]
impl BackendRegistry for HttpUploadClient {
    async fn notify_upload_complete(
        &self,
        storage_key: &str,
        intent: UploadIntent,
    ) -> Result<RegisteredUpload> {
        let context = "upload registration";
        let request = self
            .client
            .post(self.endpoint(UPLOAD_COMPLETE_PATH))
            .json(&UploadCompleteRequest {
                storage_key,
                upload_intent: intent,
            });
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error(context))?;
        ensure_success(response, context)
            .await?
            .json()
            .await
            .map_err(transport_error(context))
    }
}
