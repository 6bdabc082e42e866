pub mod log;
pub mod telegram;

use async_trait::async_trait;
use std::borrow::Cow;

use crate::error::TransportError;

pub type ChatId = String;

/// Longest message text providers accept, in UTF-16 code units.
pub const MAX_TEXT_LEN: usize = 4096;

/// Longest button payload providers accept, in bytes.
pub const MAX_BUTTON_DATA: usize = 64;

const TRUNCATED: &str = "\n… (truncated)";

/// Cuts `text` on a character boundary so it fits in [`MAX_TEXT_LEN`].
pub fn fit_text(text: &str) -> Cow<'_, str> {
    if text.encode_utf16().count() <= MAX_TEXT_LEN {
        return Cow::Borrowed(text);
    }
    let budget = MAX_TEXT_LEN - TRUNCATED.encode_utf16().count();
    let mut used = 0;
    let mut end = 0;
    for (idx, c) in text.char_indices() {
        if used + c.len_utf16() > budget {
            break;
        }
        used += c.len_utf16();
        end = idx + c.len_utf8();
    }
    Cow::Owned(format!("{}{}", text[..end].trim_end(), TRUNCATED))
}

/// Inline button attached to an outbound message. `data` is what comes back
/// as [`Input::Button`] when the user presses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Rows of buttons.
pub type Keyboard = Vec<Vec<Button>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Button(String),
}

/// One action received from a chat user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub chat: ChatId,
    pub user: Option<i64>,
    pub input: Input,
}

/// Messaging provider seam. Implementations bound nothing themselves; callers
/// wrap each call in their own timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_message(
        &self,
        chat: &str,
        text: &str,
        buttons: &[Vec<Button>],
    ) -> Result<(), TransportError>;

    /// Waits for the next batch of inbound actions. Providers without an
    /// inbound side return an empty batch.
    async fn receive_actions(&self) -> Result<Vec<Inbound>, TransportError> {
        Ok(Vec::new())
    }
}
