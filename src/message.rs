//! Message model
//!
//! A `Message` is one immutable conversational turn. The role is a closed,
//! discriminated variant (`MessageKind`) so that state derivation can match
//! on it exhaustively; tool calls only exist on assistant turns and tool-call
//! references only exist on tool turns.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

// ============================================================================
// Content
// ============================================================================

/// Content block in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
    Audio { data: String, format: AudioFormat },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentBlock::Image {
            source: ImageSource::Url { url: url.into() },
        }
    }

    /// Load an image from disk as an inline base64 block.
    ///
    /// Unknown extensions are sent as `image/png`.
    pub fn image_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let media_type = mime_guess::from_path(path)
            .first()
            .filter(|m| m.type_() == mime_guess::mime::IMAGE)
            .map_or_else(|| "image/png".to_string(), |m| m.essence_str().to_string());
        Ok(ContentBlock::Image {
            source: ImageSource::Base64 {
                media_type,
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        })
    }

    /// Load an audio clip from disk as an inline base64 block.
    pub fn audio_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("wav") => AudioFormat::Wav,
            Some(ext) if ext.eq_ignore_ascii_case("mp3") => AudioFormat::Mp3,
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("unsupported audio format: {}", other.unwrap_or("<none>")),
                ))
            }
        };
        let bytes = std::fs::read(path)?;
        Ok(ContentBlock::Audio {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            format,
        })
    }
}

/// Image source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

// ============================================================================
// Tool calls and failures
// ============================================================================

/// A capability invocation requested by an assistant turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a call with a generated id
    pub fn generated(name: impl Into<String>, arguments: Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), name, arguments)
    }
}

/// Classification of a failed capability invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No capability registered under the requested name
    CapabilityNotFound,
    /// The capability ran and reported an error
    CapabilityError,
    TimedOut,
    Cancelled,
    /// The capability task panicked
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::CapabilityNotFound => "capability_not_found",
            FailureKind::CapabilityError => "capability_error",
            FailureKind::TimedOut => "timed_out",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Panicked => "panicked",
        };
        f.write_str(s)
    }
}

/// Failure payload carried by a tool message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CapabilityFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CapabilityFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self::new(
            FailureKind::CapabilityNotFound,
            format!("no capability named '{name}'"),
        )
    }
}

// ============================================================================
// Message
// ============================================================================

/// Conversation role, derived from `MessageKind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// Role-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum MessageKind {
    System,
    User,
    Assistant {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure: Option<CapabilityFailure>,
    },
}

/// Token usage for one model call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

impl std::ops::Add for Usage {
    type Output = Usage;

    fn add(self, other: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Usage) {
        *self = *self + other;
    }
}

/// Auxiliary fields; never part of a message's identity or fingerprint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// One conversational turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(flatten)]
    pub kind: MessageKind,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    fn with_kind(kind: MessageKind, content: Vec<ContentBlock>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            content,
            metadata: MessageMetadata {
                created_at: Some(Utc::now()),
                ..MessageMetadata::default()
            },
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::System, vec![ContentBlock::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::User, vec![ContentBlock::text(text)])
    }

    pub fn user_blocks(content: Vec<ContentBlock>) -> Self {
        Self::with_kind(MessageKind::User, content)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_kind(
            MessageKind::Assistant { tool_calls: vec![] },
            vec![ContentBlock::text(text)],
        )
    }

    /// Assistant turn that requests capability invocations
    pub fn assistant_with_tools(content: Vec<ContentBlock>, tool_calls: Vec<ToolCall>) -> Self {
        Self::with_kind(MessageKind::Assistant { tool_calls }, content)
    }

    pub fn tool_result(call: &ToolCall, output: impl Into<String>) -> Self {
        Self::with_kind(
            MessageKind::Tool {
                tool_call_id: call.id.clone(),
                name: Some(call.name.clone()),
                failure: None,
            },
            vec![ContentBlock::text(output)],
        )
    }

    /// Tool turn describing a failed invocation; the failure is also
    /// rendered into the content so providers see it as plain text.
    pub fn tool_failure(call: &ToolCall, failure: CapabilityFailure) -> Self {
        let body = serde_json::json!({
            "error": { "kind": failure.kind, "message": failure.message }
        });
        Self::with_kind(
            MessageKind::Tool {
                tool_call_id: call.id.clone(),
                name: Some(call.name.clone()),
                failure: Some(failure),
            },
            vec![ContentBlock::text(body.to_string())],
        )
    }

    pub fn role(&self) -> Role {
        match self.kind {
            MessageKind::System => Role::System,
            MessageKind::User => Role::User,
            MessageKind::Assistant { .. } => Role::Assistant,
            MessageKind::Tool { .. } => Role::Tool,
        }
    }

    /// Tool calls declared by an assistant turn (empty for other roles)
    pub fn tool_calls(&self) -> &[ToolCall] {
        match &self.kind {
            MessageKind::Assistant { tool_calls } => tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// The call a tool turn answers
    pub fn tool_call_id(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&CapabilityFailure> {
        match &self.kind {
            MessageKind::Tool { failure, .. } => failure.as_ref(),
            _ => None,
        }
    }

    /// Plain-text view of the content. Non-text blocks become placeholders.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
                ContentBlock::Image { .. } => "[image]",
                ContentBlock::Audio { .. } => "[audio]",
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Copy of this message with new content and a fresh id.
    ///
    /// Edits never touch the original; the copy is meant to be placed on a
    /// new branch.
    #[must_use]
    pub fn edited(&self, content: Vec<ContentBlock>) -> Self {
        let mut copy = Self::with_kind(self.kind.clone(), content);
        copy.metadata.summary.clone_from(&self.metadata.summary);
        copy
    }

    /// Copy of this message under a fresh id, metadata preserved
    #[must_use]
    pub fn reissued(&self) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.metadata.usage = Some(usage);
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.metadata.summary = Some(summary.into());
        self
    }

    /// SHA-256 over role, content and tool-call payloads.
    ///
    /// Ids and metadata are excluded, so two messages that say the same
    /// thing hash the same.
    pub fn fingerprint(&self) -> String {
        let payload = serde_json::json!({
            "kind": self.kind_for_fingerprint(),
            "content": self.content,
        });
        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn kind_for_fingerprint(&self) -> Value {
        match &self.kind {
            // Failure detail is already rendered into the content
            MessageKind::Tool {
                tool_call_id, name, ..
            } => serde_json::json!({ "role": "tool", "tool_call_id": tool_call_id, "name": name }),
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role(), self.text())
    }
}
