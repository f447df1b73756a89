//! Image detail downgrade.
//!
//! Embeddable images are rewritten to ask the model for the lowest rendering
//! detail. Only the detail level changes; every other field of the block is
//! kept. Uploaded handles are opaque and left exactly as they are. The
//! estimator charges a flat rate per image, so this shapes the request sent
//! to the provider rather than the estimate.

use crate::completion::{ContentBlock, ImageDetail, ImageUrl, Message};

/// Downgrade every embeddable image in `message` to the lowest detail.
///
/// Messages without block content are returned as they are.
pub fn compress_images(message: Message) -> Message {
    if !message.content.blocks().iter().any(needs_downgrade) {
        return message;
    }
    let blocks: Vec<_> = message
        .content
        .blocks()
        .iter()
        .cloned()
        .map(downgrade_block)
        .collect();
    message.with_content(blocks)
}

/// Apply [`compress_images`] to every message, keeping order.
pub fn compress_all(messages: Vec<Message>) -> Vec<Message> {
    messages.into_iter().map(compress_images).collect()
}

fn needs_downgrade(block: &ContentBlock) -> bool {
    match block {
        ContentBlock::ImageUrl(image) => image.detail != Some(ImageDetail::LOWEST),
        _ => false,
    }
}

fn downgrade_block(block: ContentBlock) -> ContentBlock {
    match block {
        ContentBlock::ImageUrl(image) => ContentBlock::ImageUrl(ImageUrl {
            detail: Some(ImageDetail::LOWEST),
            ..image
        }),
        other => other,
    }
}
