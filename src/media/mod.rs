//! Media validation and normalization.
//!
//! Inbound audio/file payloads arrive as data-URI-style strings
//! (`<mime>;base64,<body>`). Validation is pure: parse, decode, enforce the
//! size ceiling, enforce the MIME allow-list, and (for audio) transcode to
//! the normalized output format. Nothing here touches the store, the group
//! registry, or the network — persistence of the validated bytes is the
//! caller's job (`media::store`).

pub mod store;
pub mod transcode;

use base64::Engine;

use crate::error::{RelayError, RelayResult};

/// Media size ceiling, applied to the decoded bytes of both audio and files.
pub const MAX_MEDIA_BYTES: usize = 5 * 1024 * 1024;

/// MIME types accepted for voice messages.
pub const ALLOWED_AUDIO_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "audio/aac",
    "audio/x-m4a",
];

/// MIME types accepted for file attachments, with the storage extension
/// each maps to.
pub const ALLOWED_FILE_TYPES: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
    ),
    ("application/vnd.ms-powerpoint", "ppt"),
    ("application/zip", "zip"),
    ("application/x-rar-compressed", "rar"),
    ("text/plain", "txt"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("video/x-matroska", "mkv"),
    ("video/quicktime", "mov"),
    ("video/x-msvideo", "avi"),
    ("audio/mpeg", "mp3"),
    ("audio/wav", "wav"),
    ("audio/ogg", "ogg"),
    ("audio/aac", "aac"),
    ("audio/x-m4a", "m4a"),
];

/// A parsed inbound media payload: declared MIME plus decoded bytes.
#[derive(Debug)]
pub struct MediaPayload {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Audio that passed validation and transcoding. `wav_bytes` is the complete
/// normalized output, produced in memory so a failed transcode leaves no
/// partial artifact on disk.
#[derive(Debug)]
pub struct ValidatedAudio {
    pub declared_mime: String,
    pub wav_bytes: Vec<u8>,
}

/// A file attachment that passed validation.
#[derive(Debug)]
pub struct ValidatedFile {
    pub mime: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Split a `<mime>;base64,<body>` payload (optionally prefixed with `data:`)
/// and decode the body. The size ceiling is checked here, before the
/// allow-list, so oversized content is `TooLarge` regardless of its type.
pub fn parse_payload(payload: &str) -> RelayResult<MediaPayload> {
    let (prefix, body) = payload
        .split_once(";base64,")
        .ok_or_else(|| RelayError::UnsupportedType("missing MIME prefix".to_string()))?;
    let mime = prefix.strip_prefix("data:").unwrap_or(prefix).trim();
    if mime.is_empty() {
        return Err(RelayError::UnsupportedType("empty MIME type".to_string()));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body.trim())
        .map_err(|e| RelayError::InvalidFrame(format!("invalid base64 body: {e}")))?;

    if bytes.len() > MAX_MEDIA_BYTES {
        return Err(RelayError::TooLarge);
    }

    Ok(MediaPayload {
        mime: mime.to_ascii_lowercase(),
        bytes,
    })
}

/// Validate an audio payload and transcode it to the normalized output
/// format (16-bit PCM WAV, channel layout preserved).
pub fn validate_audio(payload: &str) -> RelayResult<ValidatedAudio> {
    let parsed = parse_payload(payload)?;

    if !ALLOWED_AUDIO_TYPES.contains(&parsed.mime.as_str()) {
        return Err(RelayError::UnsupportedType(parsed.mime));
    }

    let wav_bytes = transcode::transcode_to_wav(&parsed.bytes, &parsed.mime)?;

    Ok(ValidatedAudio {
        declared_mime: parsed.mime,
        wav_bytes,
    })
}

/// Validate a file attachment payload.
pub fn validate_file(payload: &str) -> RelayResult<ValidatedFile> {
    let parsed = parse_payload(payload)?;

    let extension = ALLOWED_FILE_TYPES
        .iter()
        .find(|(mime, _)| *mime == parsed.mime)
        .map(|(_, ext)| ext.to_string())
        .ok_or_else(|| RelayError::UnsupportedType(parsed.mime.clone()))?;

    Ok(ValidatedFile {
        mime: parsed.mime,
        extension,
        bytes: parsed.bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn data_uri(mime: &str, bytes: &[u8]) -> String {
        format!(
            "data:{};base64,{}",
            mime,
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    #[test]
    fn parses_with_and_without_data_prefix() {
        let with = parse_payload(&data_uri("application/pdf", b"hello")).unwrap();
        assert_eq!(with.mime, "application/pdf");
        assert_eq!(with.bytes, b"hello");

        let without = parse_payload("application/pdf;base64,aGVsbG8=").unwrap();
        assert_eq!(without.bytes, b"hello");
    }

    #[test]
    fn missing_mime_prefix_is_unsupported() {
        let err = parse_payload("aGVsbG8=").unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedType(_)));
    }

    #[test]
    fn file_outside_allow_list_is_unsupported() {
        let err = validate_file(&data_uri("application/x-msdownload", b"MZ")).unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedType(_)));
    }

    #[test]
    fn audio_outside_allow_list_is_unsupported() {
        let err = validate_audio(&data_uri("audio/flac", b"fLaC")).unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedType(_)));
    }

    #[test]
    fn oversized_payload_is_too_large_even_with_bad_mime() {
        let big = vec![0u8; MAX_MEDIA_BYTES + 1];
        let err = validate_file(&data_uri("application/x-msdownload", &big)).unwrap_err();
        assert!(matches!(err, RelayError::TooLarge));
    }

    #[test]
    fn allowed_file_maps_to_extension() {
        let file = validate_file(&data_uri("image/png", b"\x89PNG")).unwrap();
        assert_eq!(file.extension, "png");
    }
}
