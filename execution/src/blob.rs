//! Storage collaborator for proof binaries.

use anyhow::Result;
use bytes::Bytes;
use std::future::Future;

use crate::settlement::ProofFile;

/// Durable object storage for proof files.
///
/// `put` resolves only once the object is durable; the returned URL is what
/// clients use to fetch it.
pub trait BlobStore: Send + Sync {
    fn put(
        &self,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> impl Future<Output = Result<String>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

const MAX_EXTENSION_LEN: usize = 8;

/// Object key for a proof: `{bet}/{stake}/{proof}.{ext}`.
///
/// The extension comes from the uploaded file name when it is a plain
/// alphanumeric suffix, else from the MIME subtype.
pub fn proof_object_key(bet_id: &str, stake_id: &str, proof_id: &str, file: &ProofFile) -> String {
    let from_name = file
        .file_name
        .as_deref()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    let from_mime = file
        .content_type
        .split(';')
        .next()
        .and_then(|mime| mime.trim().split_once('/'))
        .map(|(_, subtype)| subtype.to_ascii_lowercase());
    let extension = from_name
        .into_iter()
        .chain(from_mime)
        .find(|ext| is_safe_segment(ext) && ext.len() <= MAX_EXTENSION_LEN)
        .unwrap_or_else(|| "bin".to_string());
    format!(
        "{}/{}/{proof_id}.{extension}",
        sanitize(bet_id),
        sanitize(stake_id)
    )
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric())
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: Option<&str>, content_type: &str) -> ProofFile {
        ProofFile {
            file_name: name.map(str::to_string),
            content_type: content_type.to_string(),
            size: 10,
        }
    }

    #[test]
    fn test_extension_from_name_then_mime() {
        assert_eq!(
            proof_object_key("bet-1", "stake-1", "p1", &file(Some("Receipt.PNG"), "image/png")),
            "bet-1/stake-1/p1.png"
        );
        assert_eq!(
            proof_object_key("bet-1", "stake-1", "p1", &file(None, "video/mp4; codecs=avc1")),
            "bet-1/stake-1/p1.mp4"
        );
        assert_eq!(
            proof_object_key("bet-1", "stake-1", "p1", &file(Some("x.tar.gz/.."), "image/svg+xml")),
            "bet-1/stake-1/p1.bin"
        );
    }

    #[test]
    fn test_path_segments_are_sanitized() {
        assert_eq!(
            proof_object_key("../etc", "a/b", "p1", &file(Some("a.jpg"), "image/jpeg")),
            "___etc/a_b/p1.jpg"
        );
    }
}
