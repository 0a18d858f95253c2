//! Firmware image loading and checksumming.

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::http::MultipartForm;

/// Form field carrying the hex MD5 of the image.
pub const MD5_FIELD: &str = "MD5";
/// Form field carrying the image itself.
pub const FIRMWARE_FIELD: &str = "firmware";
/// File name sent with the image part.
pub const FIRMWARE_FILENAME: &str = "firmware";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Firmware bytes plus the checksum computed from exactly those bytes.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    path: PathBuf,
    data: Vec<u8>,
    md5: String,
}

impl FirmwareImage {
    /// Read the whole file and hash it.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(path, data))
    }

    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        let md5 = md5_hex(&data);
        Self {
            path: path.into(),
            data,
            md5,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lowercase hex MD5 of `data()`.
    pub fn md5_hex(&self) -> &str {
        &self.md5
    }

    /// Upload form: checksum text field, then the image as a file part.
    pub fn to_form(&self) -> MultipartForm {
        MultipartForm::new().text(MD5_FIELD, self.md5.clone()).file(
            FIRMWARE_FIELD,
            FIRMWARE_FILENAME,
            OCTET_STREAM,
            self.data.clone(),
        )
    }
}

/// Lowercase hex MD5 digest.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}
