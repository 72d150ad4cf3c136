use base64::Engine;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{CheckError, Result};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A file as handed over by the user, before validation
#[derive(Clone)]
pub struct SourceFile {
    pub file_name: String,
    /// Declared MIME type, if the source provided one
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    /// Read a file from disk; the declared type is left to the extension
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        Ok(Self::new(file_name, None, bytes))
    }

    /// True when the declared type (or, lacking one, the extension) says PDF
    pub fn is_pdf(&self) -> bool {
        let has_pdf_extension = Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        // Parameters such as `; charset=binary` don't change the media type
        let media_type = self.content_type.as_deref().map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        });

        match media_type.as_deref() {
            Some(PDF_CONTENT_TYPE) => true,
            // Generic types carry no information, fall back to the name
            None | Some("") | Some("application/octet-stream") => has_pdf_extension,
            Some(_) => false,
        }
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A validated, transport-encoded document. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    file_name: String,
    size: usize,
    payload: String,
}

impl Document {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Size of the original file in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Base64 of the complete file
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("file_name", &self.file_name)
            .field("size", &self.size)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

pub struct DocumentEncoder;

impl DocumentEncoder {
    /// Validate and base64-encode a file.
    ///
    /// Encoding runs on the blocking pool so large uploads don't stall the runtime.
    pub async fn encode(source: SourceFile) -> Result<Document> {
        if !source.is_pdf() {
            warn!(
                "Rejected '{}' (declared type {:?}): not a PDF",
                source.file_name, source.content_type
            );
            return Err(CheckError::Format {
                file_name: source.file_name,
            });
        }

        let SourceFile {
            file_name, bytes, ..
        } = source;
        let size = bytes.len();

        let payload = tokio::task::spawn_blocking(move || {
            base64::engine::general_purpose::STANDARD.encode(bytes)
        })
        .await
        .map_err(|e| CheckError::Internal {
            message: format!("encoding task failed: {}", e),
        })?;

        debug!("Encoded '{}' ({} bytes -> {} chars)", file_name, size, payload.len());

        Ok(Document {
            file_name,
            size,
            payload,
        })
    }
}
