// Copyright 2023 Remi Bernotavicius

use crate::query::{QueryError, QueryResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Accepts either bare base64 or a `data:<mime>;base64,<payload>` URL and
/// returns the decoded bytes, which must be a recognizable image.
pub fn decode_image(data: &str) -> QueryResult<Vec<u8>> {
    let payload = match data.trim().strip_prefix("data:") {
        Some(url) => url
            .split_once(";base64,")
            .map(|(_, payload)| payload)
            .ok_or_else(|| QueryError::validation("image data URL must be base64 encoded"))?,
        None => data.trim(),
    };
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| QueryError::validation(format!("image is not valid base64: {e}")))?;
    let format = image::guess_format(&bytes)
        .map_err(|_| QueryError::validation("image is not in a recognized format"))?;
    log::debug!("decoded {} byte {format:?} image", bytes.len());
    Ok(bytes)
}

pub fn encode_image(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

#[cfg(test)]
pub const TINY_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0x0d];

#[test]
fn data_url_round_trip() {
    let url = encode_image(TINY_PNG);
    assert!(url.starts_with("data:image/png;base64,"), "{url}");
    assert_eq!(decode_image(&url).unwrap(), TINY_PNG);
}

#[test]
fn bare_base64_is_accepted() {
    let encoded = STANDARD.encode(TINY_PNG);
    assert_eq!(decode_image(&encoded).unwrap(), TINY_PNG);
}

#[test]
fn bad_images_are_rejected() {
    let text = STANDARD.encode(b"just some text");
    for data in ["data:image/png,not-base64", "!!!", text.as_str()] {
        let e = decode_image(data).unwrap_err();
        assert!(matches!(e, QueryError::Validation(_)), "{e}");
    }
}
