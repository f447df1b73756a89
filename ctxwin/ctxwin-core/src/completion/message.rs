//! Conversation messages and their content.
//!
//! Content is either plain text or an ordered list of [`ContentBlock`]s. The
//! JSON form follows the chat-completions shape most providers accept, so a
//! stored conversation can be loaded and handed back without conversion.
//! Blocks this crate does not understand are kept verbatim as
//! [`ContentBlock::Other`] instead of being rejected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

/// Prefix marking an image reference as a file that was already uploaded.
pub const UPLOAD_HANDLE_PREFIX: &str = "file_id:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai")]
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, deserialize_with = "nullable_content")]
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Provider-specific fields (tool calls, response metadata, ...) carried
    /// through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<Content>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            extra: Map::new(),
        }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A tool result answering the call identified by `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Copy of this message with its content replaced. Every other field,
    /// including provider extras, is kept.
    pub fn with_content(self, content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            ..self
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

fn nullable_content<'de, D>(deserializer: D) -> Result<Content, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Content>::deserialize(deserializer)?.unwrap_or_default())
}

/// Message content: a plain text span or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
    /// Content of any other JSON shape, kept verbatim and costed at zero.
    Other(Value),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Blocks(_) | Content::Other(_) => None,
        }
    }

    /// The blocks of block-structured content; empty for anything else.
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Content::Blocks(blocks) => blocks,
            Content::Text(_) | Content::Other(_) => &[],
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_owned())
    }
}

impl From<Vec<ContentBlock>> for Content {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Content::Blocks(blocks)
    }
}

/// Rendering fidelity requested for an embeddable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

impl ImageDetail {
    pub const LOWEST: ImageDetail = ImageDetail::Low;

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
            ImageDetail::Auto => "auto",
        }
    }
}

/// A text span. Fields next to `text` on the block (`cache_control`, ...)
/// are kept in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub text: String,
    pub extra: Map<String, Value>,
}

/// An image the model fetches or decodes from a URL (http or data URI).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    pub detail: Option<ImageDetail>,
    /// Other keys of the `image_url` object, including a detail level this
    /// crate does not recognize.
    pub params: Map<String, Value>,
    /// Fields next to `image_url` on the block.
    pub extra: Map<String, Value>,
}

impl ImageUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            detail: None,
            params: Map::new(),
            extra: Map::new(),
        }
    }

    pub fn with_detail(mut self, detail: ImageDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// An image referenced through an opaque handle, e.g. an uploaded file.
///
/// The original block is kept as received and serialized back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHandle {
    reference: Option<String>,
    block: Value,
}

impl ImageHandle {
    /// Handle for a file uploaded under `file_id`.
    pub fn uploaded(file_id: impl AsRef<str>) -> Self {
        let url = format!("{UPLOAD_HANDLE_PREFIX}{}", file_id.as_ref());
        let block = json!({ "type": "image_url", "image_url": { "url": url } });
        Self {
            reference: Some(url),
            block,
        }
    }

    /// The opaque reference string, if the block carries one. Inline
    /// (base64) sources have none.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(TextBlock),
    ImageUrl(ImageUrl),
    ImageHandle(ImageHandle),
    /// Any block kind this crate does not interpret, kept verbatim.
    Other(Value),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextBlock {
            text: text.into(),
            extra: Map::new(),
        })
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentBlock::ImageUrl(ImageUrl::new(url))
    }

    pub fn uploaded_image(file_id: impl AsRef<str>) -> Self {
        ContentBlock::ImageHandle(ImageHandle::uploaded(file_id))
    }

    fn from_value(value: Value) -> Self {
        let mut fields = match value {
            Value::String(text) => return ContentBlock::text(text),
            Value::Object(fields) => fields,
            other => return ContentBlock::Other(other),
        };

        let kind = fields
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned);
        match kind.as_deref() {
            Some("text") => match fields.remove("text") {
                Some(Value::String(text)) => {
                    fields.remove("type");
                    ContentBlock::Text(TextBlock {
                        text,
                        extra: fields,
                    })
                }
                text => {
                    if let Some(text) = text {
                        fields.insert("text".into(), text);
                    }
                    ContentBlock::Other(Value::Object(fields))
                }
            },
            Some("image_url") => match parse_image_url(fields.get("image_url")) {
                Some(image) if image.url.starts_with(UPLOAD_HANDLE_PREFIX) => {
                    ContentBlock::ImageHandle(ImageHandle {
                        reference: Some(image.url),
                        block: Value::Object(fields),
                    })
                }
                Some(mut image) => {
                    fields.remove("type");
                    fields.remove("image_url");
                    image.extra = fields;
                    ContentBlock::ImageUrl(image)
                }
                None => ContentBlock::Other(Value::Object(fields)),
            },
            Some("image") => {
                let reference = match fields.get("source") {
                    Some(Value::Object(source)) => Some(
                        source
                            .get("file_id")
                            .or_else(|| source.get("url"))
                            .and_then(Value::as_str)
                            .map(str::to_owned),
                    ),
                    _ => None,
                };
                match reference {
                    Some(reference) => ContentBlock::ImageHandle(ImageHandle {
                        reference,
                        block: Value::Object(fields),
                    }),
                    None => ContentBlock::Other(Value::Object(fields)),
                }
            }
            _ => ContentBlock::Other(Value::Object(fields)),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            ContentBlock::Text(block) => {
                let mut fields = block.extra.clone();
                fields.insert("type".into(), "text".into());
                fields.insert("text".into(), block.text.as_str().into());
                Value::Object(fields)
            }
            ContentBlock::ImageUrl(image) => {
                let mut inner = image.params.clone();
                inner.insert("url".into(), image.url.as_str().into());
                if let Some(detail) = image.detail {
                    inner.insert("detail".into(), detail.as_str().into());
                }

                let mut fields = image.extra.clone();
                fields.insert("type".into(), "image_url".into());
                fields.insert("image_url".into(), Value::Object(inner));
                Value::Object(fields)
            }
            ContentBlock::ImageHandle(handle) => handle.block.clone(),
            ContentBlock::Other(value) => value.clone(),
        }
    }
}

/// Accepts both `"image_url": "<url>"` and `"image_url": {"url": .., "detail": ..}`.
/// An unrecognized detail level stays in `params` rather than failing the block.
fn parse_image_url(field: Option<&Value>) -> Option<ImageUrl> {
    match field? {
        Value::String(url) => Some(ImageUrl::new(url.as_str())),
        Value::Object(object) => {
            let url = object.get("url")?.as_str()?.to_owned();
            let detail = object
                .get("detail")
                .and_then(|detail| ImageDetail::deserialize(detail).ok());

            let mut params = object.clone();
            params.remove("url");
            if detail.is_some() {
                params.remove("detail");
            }
            Some(ImageUrl {
                url,
                detail,
                params,
                extra: Map::new(),
            })
        }
        _ => None,
    }
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ContentBlock::from_value)
    }
}
