use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{Fields, StorageResult};

use super::{parse_field, required_field, truncate_chars};

/// Largest decoded logo accepted.
pub const MAX_LOGO_BYTES: usize = 1024 * 1024;
const MAX_FILENAME_LENGTH: usize = 255;
pub const ALLOWED_LOGO_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/svg+xml",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogoError {
    #[error("No image provided")]
    Missing,
    #[error("Image data is not valid base64")]
    Encoding,
    #[error("Image must be {} bytes or smaller", MAX_LOGO_BYTES)]
    TooLarge,
    #[error("Unsupported image type")]
    UnsupportedType,
}

/// Image as submitted by the customer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoUpload {
    pub filename: String,
    pub content_type: String,
    pub encoded: String,
}

/// Stored logo of a custom domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logo {
    pub filename: String,
    pub content_type: String,
    pub encoded: String,
    pub bytes: u64,
    pub uploaded: i64,
}

impl Logo {
    pub fn from_upload(upload: &LogoUpload, now: DateTime<Utc>) -> Result<Self, LogoError> {
        let encoded = upload.encoded.trim();
        if encoded.is_empty() {
            return Err(LogoError::Missing);
        }
        let content_type = upload.content_type.trim().to_ascii_lowercase();
        if !ALLOWED_LOGO_TYPES.contains(&content_type.as_str()) {
            return Err(LogoError::UnsupportedType);
        }
        // Cheap bound before decoding: 4 encoded chars carry 3 bytes.
        if encoded.len() / 4 * 3 > MAX_LOGO_BYTES + 3 {
            return Err(LogoError::TooLarge);
        }
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| LogoError::Encoding)?;
        if decoded.len() > MAX_LOGO_BYTES {
            return Err(LogoError::TooLarge);
        }

        Ok(Self {
            filename: sanitize_filename(&upload.filename),
            content_type,
            encoded: encoded.to_string(),
            bytes: decoded.len() as u64,
            uploaded: now.timestamp(),
        })
    }

    pub fn to_fields(&self) -> Fields {
        Fields::from([
            ("filename".to_string(), self.filename.clone()),
            ("content_type".to_string(), self.content_type.clone()),
            ("encoded".to_string(), self.encoded.clone()),
            ("bytes".to_string(), self.bytes.to_string()),
            ("uploaded".to_string(), self.uploaded.to_string()),
        ])
    }

    pub fn from_fields(fields: &Fields) -> StorageResult<Self> {
        Ok(Self {
            filename: required_field(fields, "filename")?.to_owned(),
            content_type: required_field(fields, "content_type")?.to_owned(),
            encoded: required_field(fields, "encoded")?.to_owned(),
            bytes: parse_field(fields, "bytes")?,
            uploaded: parse_field(fields, "uploaded")?,
        })
    }
}

/// Keeps the final path component, dropping anything that could traverse.
fn sanitize_filename(input: &str) -> String {
    let name = input
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    let name = if name.is_empty() || name == "." || name == ".." {
        "logo"
    } else {
        name
    };
    truncate_chars(name, MAX_FILENAME_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(content_type: &str, bytes: &[u8]) -> LogoUpload {
        LogoUpload {
            filename: "../../etc/brand.png".into(),
            content_type: content_type.into(),
            encoded: general_purpose::STANDARD.encode(bytes),
        }
    }

    #[test]
    fn accepts_supported_images() {
        let logo = Logo::from_upload(&upload("image/PNG", b"\x89PNG...."), Utc::now()).unwrap();
        assert_eq!(logo.filename, "brand.png");
        assert_eq!(logo.content_type, "image/png");
        assert_eq!(logo.bytes, 8);
        assert_eq!(Logo::from_fields(&logo.to_fields()).unwrap(), logo);
    }

    #[test]
    fn rejects_bad_uploads() {
        assert_eq!(
            Logo::from_upload(&upload("application/pdf", b"%PDF"), Utc::now()),
            Err(LogoError::UnsupportedType)
        );
        assert_eq!(
            Logo::from_upload(&LogoUpload::default(), Utc::now()),
            Err(LogoError::Missing)
        );
        let mut garbled = upload("image/gif", b"GIF89a");
        garbled.encoded = "!!!not base64!!!".into();
        assert_eq!(
            Logo::from_upload(&garbled, Utc::now()),
            Err(LogoError::Encoding)
        );
    }

    #[test]
    fn rejects_oversized_images() {
        let big = vec![0u8; MAX_LOGO_BYTES + 1];
        assert_eq!(
            Logo::from_upload(&upload("image/webp", &big), Utc::now()),
            Err(LogoError::TooLarge)
        );
    }

    #[test]
    fn filenames_fall_back_when_empty() {
        assert_eq!(sanitize_filename("dir/"), "logo");
        assert_eq!(sanitize_filename(".."), "logo");
        assert_eq!(sanitize_filename("C:\\images\\mark.svg"), "mark.svg");
    }
}
