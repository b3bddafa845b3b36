use {
    crate::*,
    base64::{Engine as _, engine::general_purpose::STANDARD},
};

pub const JPEG_MIME: &str = "image/jpeg";

/// Standard (padded) base64 of a binary payload.
pub fn to_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn from_base64(text: &str) -> Result<Vec<u8>, ImageError> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| ImageError::Transport(format!("invalid base64: {e}")))
}

/// `data:<mime>;base64,<payload>`
pub fn to_data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{mime};base64,{}", to_base64(data))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataUrl {
    pub mime: String,
    pub data: Vec<u8>,
}

/// Parse a base64 data URL. Non-base64 data URLs are rejected.
pub fn parse_data_url(url: &str) -> Result<DataUrl, ImageError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ImageError::Transport("missing data: scheme".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageError::Transport("missing ',' in data URL".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| ImageError::Transport("data URL is not base64".to_string()))?;
    Ok(DataUrl {
        mime: mime.to_string(),
        data: from_base64(payload)?,
    })
}
