//! Conversion of persisted chat messages into transcript messages.

use toolchat_core::{ChatMessage, ContentPart, StoredMessage, StoredRole};

use crate::input::{AttachmentError, document_part, image_parts, is_image_path};

/// Placeholder for stored messages with blank text; providers reject empty content.
const EMPTY_CONTENT: &str = ".";

/// Convert a stored conversation into transcript messages, in order.
///
/// Messages without files stay plain text. Files become structured content:
/// images are inlined, everything else is a document reference.
pub async fn convert_stored_messages(
    messages: &[StoredMessage],
) -> Result<Vec<ChatMessage>, AttachmentError> {
    let mut converted = Vec::with_capacity(messages.len());

    for message in messages {
        let text = message
            .content
            .as_deref()
            .filter(|content| !content.trim().is_empty())
            .unwrap_or(EMPTY_CONTENT);

        let chat_message = if message.files.is_empty() {
            match message.role {
                StoredRole::User => ChatMessage::human(text),
                StoredRole::Assistant => ChatMessage::ai(text),
            }
        } else {
            let mut parts = vec![ContentPart::text(text)];
            for file in &message.files {
                if is_image_path(file) {
                    parts.extend(image_parts(file).await?);
                } else {
                    parts.push(document_part(file));
                }
            }
            match message.role {
                StoredRole::User => ChatMessage::human(parts),
                StoredRole::Assistant => ChatMessage::ai(parts),
            }
        };

        converted.push(chat_message);
    }

    Ok(converted)
}
