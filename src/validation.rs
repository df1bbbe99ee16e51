use crate::constants::{
    IMAGE_SIZE_MESSAGE, IMAGE_TYPE_MESSAGE, MAX_IMAGE_FILE_SIZE, MAX_VIDEO_FILE_SIZE,
    VIDEO_SIZE_MESSAGE, VIDEO_TYPE_MESSAGE,
};
use crate::error::{PipelineError, Result};
use crate::formats::MediaKind;
use crate::media::MediaFile;

/// Outcome of a pre-upload check. The message is present iff the file is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    error: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self { error: None }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn into_result(self) -> Result<()> {
        match self.error {
            None => Ok(()),
            Some(message) => Err(PipelineError::Validation(message)),
        }
    }
}

/// Checks that a file is an image no larger than 10MB.
pub fn validate_image(file: &MediaFile) -> ValidationResult {
    if file.kind() != Some(MediaKind::Image) {
        return ValidationResult::invalid(IMAGE_TYPE_MESSAGE);
    }
    if file.size() > MAX_IMAGE_FILE_SIZE {
        return ValidationResult::invalid(IMAGE_SIZE_MESSAGE);
    }
    ValidationResult::valid()
}

/// Checks that a file is a video no larger than 100MB.
pub fn validate_video(file: &MediaFile) -> ValidationResult {
    if file.kind() != Some(MediaKind::Video) {
        return ValidationResult::invalid(VIDEO_TYPE_MESSAGE);
    }
    if file.size() > MAX_VIDEO_FILE_SIZE {
        return ValidationResult::invalid(VIDEO_SIZE_MESSAGE);
    }
    ValidationResult::valid()
}

pub fn validate_media(file: &MediaFile) -> ValidationResult {
    match file.kind() {
        Some(MediaKind::Image) => validate_image(file),
        Some(MediaKind::Video) => validate_video(file),
        None => ValidationResult::invalid(format!("Unsupported file type: {}", file.mime_type)),
    }
}
