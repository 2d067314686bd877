//! Upload validation: refuse disallowed content before anything is allocated.
//!
//! Pure function over the upload's declared metadata. It runs first so a
//! rejected upload never touches the scratch directory.

use crate::error::RejectionReason;
use crate::output::UploadedFile;
use std::fmt;

/// Largest accepted upload: 10 MiB.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// The media types the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
    Pdf,
}

impl MediaType {
    /// Parse a declared MIME type.
    ///
    /// Case-insensitive; parameters after `;` are ignored. `image/jpg` is
    /// accepted because some browsers still send it.
    pub fn from_declared(declared: &str) -> Option<Self> {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Some(MediaType::Jpeg),
            "image/png" => Some(MediaType::Png),
            "application/pdf" => Some(MediaType::Pdf),
            _ => None,
        }
    }

    /// Guess from a file extension; used by hosts that only have a path.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "png" => Some(MediaType::Png),
            "pdf" => Some(MediaType::Pdf),
            _ => None,
        }
    }

    /// Only images go through OCR.
    pub fn is_image(self) -> bool {
        matches!(self, MediaType::Jpeg | MediaType::Png)
    }

    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Pdf => "application/pdf",
        }
    }

    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            MediaType::Jpeg => "jpg",
            MediaType::Png => "png",
            MediaType::Pdf => "pdf",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Validate an upload's type and size.
///
/// The size check uses the larger of the declared size and the actual
/// payload length, so a client cannot under-declare its way past the limit.
pub fn validate(file: &UploadedFile) -> Result<MediaType, RejectionReason> {
    let media = MediaType::from_declared(file.declared_type()).ok_or_else(|| {
        RejectionReason::InvalidType {
            declared: file.declared_type().to_string(),
        }
    })?;

    let size = file.declared_size().max(file.bytes().len() as u64);
    if size > MAX_FILE_SIZE {
        return Err(RejectionReason::TooLarge {
            size,
            limit: MAX_FILE_SIZE,
        });
    }

    Ok(media)
}
