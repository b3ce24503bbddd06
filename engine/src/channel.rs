//! The duplex text channel to an engine process.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{EngineCommand, GoParams};

/// Raw output lines from the engine, trimmed, in the order they were written.
pub type OutputLines = mpsc::Receiver<String>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Engine executable not found")]
    NotFound,
    #[error("Failed to spawn engine: {0}")]
    Spawn(String),
    #[error("Engine has no stdin")]
    NoStdin,
    #[error("Engine has no stdout")]
    NoStdout,
    #[error("IO error: {0}")]
    Io(String),
    #[error("Engine channel is closed")]
    Closed,
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Sink for commands plus a source of output lines.
///
/// Only the UCI coordinator writes to a channel. The handshake (`uci`,
/// `isready`) is driven by the caller through [`EngineChannel::send`].
#[async_trait]
pub trait EngineChannel: Send {
    /// Start the engine and begin listening to its output. Calling this on an
    /// open channel tears the previous engine down first.
    async fn initialize(&mut self) -> Result<OutputLines, EngineError>;

    async fn send(&mut self, command: EngineCommand) -> Result<(), EngineError>;

    /// Release the engine. Idempotent.
    async fn dispose(&mut self);

    /// `setoption` pairs to send once the engine has answered `uciok`.
    fn startup_options(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    async fn set_position(&mut self, fen: &str, moves: &[String]) -> Result<(), EngineError> {
        self.send(EngineCommand::SetPosition {
            fen: fen.to_string(),
            moves: moves.to_vec(),
        })
        .await
    }

    async fn start_analysis(&mut self, params: GoParams) -> Result<(), EngineError> {
        self.send(EngineCommand::Go(params)).await
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        self.send(EngineCommand::Stop).await
    }
}
