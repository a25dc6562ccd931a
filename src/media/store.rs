//! Validated media file storage.
//!
//! Media lives under `{data_dir}/media/`: normalized audio in `audio/`,
//! file attachments in `files/`. Audio paths are deterministic per sender
//! with the fixed normalized extension; attachment names carry the sender
//! and the extension derived from the validated MIME type. Only validated
//! bytes ever reach this module.

use std::path::{Path, PathBuf};

use crate::error::{RelayError, RelayResult};

/// Subdirectory of the data dir that holds all stored media.
const MEDIA_DIR: &str = "media";

/// Replace every character outside [A-Za-z0-9._-] so a principal identifier
/// can never smuggle path syntax into a file name.
pub fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Relative storage path for a sender's normalized voice message.
pub fn audio_rel_path(sender: &str) -> String {
    format!("audio/audio_{}.wav", sanitize(sender))
}

/// Relative storage path for a sender's file attachment.
pub fn file_rel_path(sender: &str, extension: &str) -> String {
    format!("files/file_{}.{}", sanitize(sender), sanitize(extension))
}

/// Public URL a stored media reference resolves at.
pub fn media_url(rel_path: &str) -> String {
    format!("/media/{rel_path}")
}

fn media_root(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join(MEDIA_DIR)
}

/// Write validated media bytes at their relative path, creating parent
/// directories as needed. The bytes are complete before this is called, so
/// the single write cannot leave a truncated artifact behind a success.
pub fn store_media(data_dir: &str, rel_path: &str, bytes: &[u8]) -> RelayResult<()> {
    let path = media_root(data_dir).join(rel_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| RelayError::Persistence(format!("create media dir: {e}")))?;
    }
    std::fs::write(&path, bytes)
        .map_err(|e| RelayError::Persistence(format!("write media file: {e}")))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Stored media file");
    Ok(())
}

/// Read a stored media file by kind (`audio`/`files`) and bare file name.
/// Returns None when the file does not exist or the name carries path
/// components.
pub fn load_media(data_dir: &str, kind: &str, name: &str) -> Option<Vec<u8>> {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return None;
    }
    let path = media_root(data_dir).join(kind).join(name);
    std::fs::read(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_syntax() {
        assert_eq!(sanitize("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize("alice"), "alice");
        assert_eq!(sanitize(""), "_");
    }

    #[test]
    fn audio_path_is_deterministic_per_sender() {
        assert_eq!(audio_rel_path("alice"), "audio/audio_alice.wav");
        assert_eq!(audio_rel_path("alice"), audio_rel_path("alice"));
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();

        store_media(data_dir, "files/file_bob.pdf", b"%PDF-").unwrap();
        let loaded = load_media(data_dir, "files", "file_bob.pdf").unwrap();
        assert_eq!(loaded, b"%PDF-");
    }

    #[test]
    fn load_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        store_media(data_dir, "files/secret.txt", b"x").unwrap();

        assert!(load_media(data_dir, "files", "../files/secret.txt").is_none());
    }
}
