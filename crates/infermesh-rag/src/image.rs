//! Image attachment pipeline.
//!
//! OCR and image description run in parallel against the host; one
//! succeeding is enough, both failing is fatal. The combined text is
//! chunked, embedded and uploaded as session vectors.

use crate::error::{RagError, Result};
use crate::host_api::HostApiClient;
use crate::vectors::VectorAttachment;
use base64::Engine;
use infermesh_session::VectorRecord;
use serde_json::json;
use tracing::{debug, warn};

/// Characters per chunk fed to the embedder.
const CHUNK_SIZE: usize = 800;
/// Overlap between adjacent chunks so sentences at boundaries survive.
const CHUNK_OVERLAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl ImageFormat {
    pub fn from_extension(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }
}

/// What the vision endpoints produced for one image.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub combined_text: String,
    pub had_description: bool,
    pub had_text: bool,
}

/// Run OCR and description in parallel; combine whatever succeeded.
pub async fn process_image(
    host_api: &HostApiClient,
    image_bytes: &[u8],
    format: ImageFormat,
) -> Result<ProcessedImage> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);

    let (ocr_result, describe_result) = tokio::join!(
        host_api.ocr(&encoded, format.as_str()),
        host_api.describe_image(&encoded, format.as_str()),
    );

    let text = match ocr_result {
        Ok(ocr) if !ocr.text.trim().is_empty() => Some(ocr.text),
        Ok(_) => None,
        Err(e) => {
            warn!("ocr failed: {e}");
            None
        }
    };
    let description = match describe_result {
        Ok(desc) if !desc.description.trim().is_empty() => Some(desc.description),
        Ok(_) => None,
        Err(e) => {
            warn!("describe failed: {e}");
            None
        }
    };

    if text.is_none() && description.is_none() {
        return Err(RagError::ImageProcessingFailed);
    }

    let mut combined = String::new();
    if let Some(desc) = &description {
        combined.push_str("[Image Description]\n");
        combined.push_str(desc);
    }
    if let Some(text) = &text {
        if !combined.is_empty() {
            combined.push_str("\n\n");
        }
        combined.push_str("[Extracted Text]\n");
        combined.push_str(text);
    }

    Ok(ProcessedImage {
        combined_text: combined,
        had_description: description.is_some(),
        had_text: text.is_some(),
    })
}

/// Split text into overlapping chunks on char boundaries.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    assert!(overlap < chunk_size, "overlap must be smaller than the chunk size");
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let step = chunk_size - overlap;
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Full pipeline: vision endpoints, chunking, embedding, upload.
/// Returns the number of vectors attached.
pub async fn attach_image(
    attachment: &VectorAttachment,
    host_api: &HostApiClient,
    document_id: &str,
    image_bytes: &[u8],
    format: ImageFormat,
) -> Result<u32> {
    let processed = process_image(host_api, image_bytes, format).await?;
    let chunks = chunk_text(&processed.combined_text, CHUNK_SIZE, CHUNK_OVERLAP);
    debug!("image `{document_id}`: {} chunks to embed", chunks.len());

    let embeddings = host_api.embed(&chunks).await?;
    if embeddings.len() != chunks.len() {
        return Err(RagError::Http(format!(
            "embed returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        )));
    }

    let records: Vec<VectorRecord> = chunks
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (text, vector))| {
            let mut metadata = serde_json::Map::new();
            metadata.insert("text".into(), json!(text));
            metadata.insert("source".into(), json!(document_id));
            metadata.insert("chunk".into(), json!(i));
            VectorRecord { id: format!("{document_id}#{i}"), vector, metadata }
        })
        .collect();

    attachment.upload(records, false).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImageFormat::from_extension("scan.PNG"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_extension("photo.jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("anim.gif"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_extension("doc.pdf"), None);
    }

    #[test]
    fn test_chunking_covers_whole_text() {
        let text = "abcdefghij".repeat(30); // 300 chars
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        // First chunk starts at the beginning, last ends at the end
        assert!(text.starts_with(&chunks[0]));
        assert!(text.ends_with(chunks.last().unwrap()));
    }

    #[test]
    fn test_chunk_overlap_repeats_boundary() {
        let text: String = ('a'..='z').collect();
        let chunks = chunk_text(&text, 10, 4);
        assert_eq!(&chunks[0][6..], &chunks[1][..4]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("", 100, 10).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("hello", 100, 10);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }
}
