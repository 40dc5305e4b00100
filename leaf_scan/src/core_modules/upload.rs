// THEORY:
// The file-upload acquisition surface. A user picks one file; if it declares an
// image media type it becomes the current selection and is turned into a data
// URL preview, which is exactly what the classifier consumes. Anything else is
// ignored without touching the current state.
//
// The bytes are not decoded here. A corrupt file that claims to be an image is
// still selectable; validating pixels is the classifier's concern.

use std::path::Path;

use tracing::debug;

use crate::core_modules::frame::EncodedImage;
use crate::error::PipelineError;

/// Displayed next to the picker; not enforced.
pub const MAX_UPLOAD_BYTES_HINT: u64 = 10 * 1024 * 1024;

/// A file handed over by the host, e.g. a multipart form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    /// The media type declared by the sender, if any.
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, media_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type,
            bytes,
        }
    }

    /// Reads a file from disk, leaving the media type to be guessed from its name.
    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, None, bytes))
    }

    /// The declared media type, or one guessed from the file extension.
    pub fn effective_media_type(&self) -> Option<String> {
        match self.media_type.as_deref() {
            Some(declared) if !declared.is_empty() => Some(declared.to_ascii_lowercase()),
            _ => mime_guess::from_path(&self.name)
                .first()
                .map(|mime| mime.essence_str().to_string()),
        }
    }

    pub fn is_image(&self) -> bool {
        self.effective_media_type()
            .is_some_and(|media_type| media_type.starts_with("image/"))
    }
}

/// Selection state of the upload surface.
#[derive(Debug, Default)]
pub struct FileUpload {
    selected: Option<UploadedFile>,
    preview: Option<EncodedImage>,
}

impl FileUpload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects `file` if it is an image.
    pub fn try_select(&mut self, file: UploadedFile) -> Result<(), PipelineError> {
        let media_type = file.effective_media_type();
        if !file.is_image() {
            return Err(PipelineError::UnsupportedFile(
                media_type.unwrap_or_else(|| "unknown".to_string()),
            ));
        }
        let media_type = media_type.unwrap_or_default();
        self.preview = Some(EncodedImage::from_bytes(&media_type, &file.bytes));
        self.selected = Some(file);
        Ok(())
    }

    /// Like `try_select`, but silently ignores non-image files.
    pub fn select(&mut self, file: UploadedFile) -> bool {
        let name = file.name.clone();
        match self.try_select(file) {
            Ok(()) => true,
            Err(e) => {
                debug!(file = %name, error = %e, "ignoring upload");
                false
            }
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.preview = None;
    }

    pub fn selected(&self) -> Option<&UploadedFile> {
        self.selected.as_ref()
    }

    pub fn preview(&self) -> Option<&EncodedImage> {
        self.preview.as_ref()
    }

    pub fn has_selection(&self) -> bool {
        self.selected.is_some() && self.preview.is_some()
    }
}
