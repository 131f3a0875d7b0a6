//! Normalization of user input and attachments into a human message.
//!
//! Images are inlined as base64 `data:` URIs next to a markdown reference to
//! the given path. Documents are referenced by path only and never read.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use toolchat_core::{ChatMessage, ContentPart, QueryAttachments, QueryInput};

/// File extensions treated as images when converting stored history.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// An attachment could not be turned into message content.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Failed to read image '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Build the human message for one query.
pub async fn normalize_input(input: QueryInput) -> Result<ChatMessage, AttachmentError> {
    match input {
        QueryInput::Text(text) => Ok(ChatMessage::human(text)),
        QueryInput::Structured(attachments) => {
            Ok(ChatMessage::human(structured_parts(attachments).await?))
        }
    }
}

async fn structured_parts(
    attachments: QueryAttachments,
) -> Result<Vec<ContentPart>, AttachmentError> {
    let mut parts = Vec::with_capacity(1 + attachments.images.len() * 2 + attachments.documents.len());

    if let Some(text) = attachments.text.filter(|t| !t.is_empty()) {
        parts.push(ContentPart::text(text));
    }

    for image in &attachments.images {
        parts.extend(image_parts(image).await?);
    }

    for document in &attachments.documents {
        parts.push(document_part(document));
    }

    Ok(parts)
}

/// Markdown reference plus inline image for `path`.
pub(crate) async fn image_parts(path: &str) -> Result<[ContentPart; 2], AttachmentError> {
    let url = image_url(path).await?;
    Ok([
        ContentPart::text(format!("![Image]({path})")),
        ContentPart::image(url),
    ])
}

pub(crate) fn document_part(path: &str) -> ContentPart {
    ContentPart::text(format!("![Document]({path})"))
}

/// Whether a stored file path names an image.
pub(crate) fn is_image_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// `data:` URI for a local image. URLs that are already usable pass through.
async fn image_url(path: &str) -> Result<String, AttachmentError> {
    if path.starts_with("data:") || path.starts_with("http://") || path.starts_with("https://") {
        return Ok(path.to_string());
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| AttachmentError::Read {
            path: path.to_string(),
            source,
        })?;

    Ok(format!(
        "data:{};base64,{}",
        image_mime_type(path),
        BASE64.encode(bytes)
    ))
}

fn image_mime_type(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolchat_core::MessageContent;

    #[tokio::test]
    async fn test_plain_text_input() {
        let message = normalize_input("Hello".into()).await.unwrap();
        assert_eq!(message, ChatMessage::human("Hello"));
    }

    #[tokio::test]
    async fn test_image_inlined_with_markdown_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();
        let path = path.to_str().unwrap().to_string();

        let input = QueryAttachments {
            text: Some("what is this".to_string()),
            images: vec![path.clone()],
            documents: vec!["/docs/report.pdf".to_string()],
        };
        let message = normalize_input(input.into()).await.unwrap();

        let MessageContent::Parts(parts) = message.content() else {
            panic!("expected structured content");
        };
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], ContentPart::text("what is this"));
        assert_eq!(parts[1], ContentPart::text(format!("![Image]({path})")));
        assert_eq!(parts[2], ContentPart::image("data:image/png;base64,iVBORw=="));
        assert_eq!(parts[3], ContentPart::text("![Document](/docs/report.pdf)"));
    }

    #[tokio::test]
    async fn test_missing_image_is_an_error() {
        let input = QueryAttachments {
            images: vec!["/nonexistent/cat.png".to_string()],
            ..QueryAttachments::default()
        };
        let err = normalize_input(input.into()).await.unwrap_err();
        assert!(matches!(err, AttachmentError::Read { .. }));
    }

    #[tokio::test]
    async fn test_data_uri_passes_through() {
        let [_, image] = image_parts("data:image/gif;base64,R0lG").await.unwrap();
        assert_eq!(image, ContentPart::image("data:image/gif;base64,R0lG"));
    }

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path("/tmp/photo.JPG"));
        assert!(is_image_path("a.webp"));
        assert!(!is_image_path("notes.pdf"));
        assert!(!is_image_path("png"));
    }
}
