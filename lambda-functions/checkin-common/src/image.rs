use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{CheckinError, CheckinResult};

/// Largest image the face service accepts as inline bytes.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(PNG_MAGIC) {
            Some(Self::Png)
        } else {
            None
        }
    }
}

/// Decoded photo bytes ready to hand to the face service.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

/// Decodes an `image_base64` field: standard alphabet, line breaks allowed,
/// optional `data:image/...;base64,` prefix.
pub fn decode_image(encoded: &str) -> CheckinResult<DecodedImage> {
    let trimmed = encoded.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| CheckinError::Validation("Malformed image data URL".to_string()))?,
        None => trimmed,
    };

    // MIME encoders wrap at 76 columns.
    let payload: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(CheckinError::Validation("image_base64 is empty".to_string()));
    }

    let bytes = STANDARD
        .decode(&payload)
        .map_err(|e| CheckinError::Validation(format!("image_base64 is not valid base64: {e}")))?;

    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(CheckinError::Validation(format!(
            "Image is {} bytes, limit is {}",
            bytes.len(),
            MAX_IMAGE_BYTES
        )));
    }

    let format = ImageFormat::sniff(&bytes).ok_or_else(|| {
        CheckinError::Validation("Image must be a JPEG or PNG".to_string())
    })?;

    Ok(DecodedImage { bytes, format })
}
