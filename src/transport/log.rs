use async_trait::async_trait;
use tracing::info;

use super::{Button, Transport};
use crate::error::TransportError;

/// Fallback used when no chat provider is configured: every message ends up
/// in the process log.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send_message(
        &self,
        chat: &str,
        text: &str,
        _buttons: &[Vec<Button>],
    ) -> Result<(), TransportError> {
        info!(chat = %chat, "notification:\n{}", text);
        Ok(())
    }
}
