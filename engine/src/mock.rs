//! Scripted engine channel for tests - only compiled in test mode or with the
//! `mock` feature.

use crate::channel::{EngineChannel, EngineError, OutputLines};
use crate::EngineCommand;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

const MOCK_OUTPUT_BUFFER: usize = 1024;

/// A fake engine that answers the UCI handshake and records every command.
///
/// Clones share state, so a test keeps one clone to drive and inspect the
/// engine while the coordinator owns another.
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    failing_initializations: usize,
    silent_handshake: bool,
    ignore_stop: bool,
    initialize_calls: usize,
    dispose_calls: usize,
    sent: Vec<EngineCommand>,
    output: Option<mpsc::Sender<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `count` calls to `initialize` fail.
    pub fn with_failing_initializations(self, count: usize) -> Self {
        self.lock().failing_initializations = count;
        self
    }

    /// Never answer `uci` / `isready`, so the handshake times out.
    pub fn with_silent_handshake(self) -> Self {
        self.lock().silent_handshake = true;
        self
    }

    /// Never answer `stop` with a `bestmove`.
    pub fn with_ignored_stop(self) -> Self {
        self.lock().ignore_stop = true;
        self
    }

    pub fn initialize_calls(&self) -> usize {
        self.lock().initialize_calls
    }

    pub fn dispose_calls(&self) -> usize {
        self.lock().dispose_calls
    }

    /// Every command received so far, in order.
    pub fn sent_commands(&self) -> Vec<EngineCommand> {
        self.lock().sent.clone()
    }

    /// Only the `position` commands received so far.
    pub fn submitted_positions(&self) -> Vec<EngineCommand> {
        self.lock()
            .sent
            .iter()
            .filter(|cmd| matches!(cmd, EngineCommand::SetPosition { .. }))
            .cloned()
            .collect()
    }

    /// Push one line onto the engine's output. Returns false when the channel
    /// is not open.
    pub fn emit(&self, line: &str) -> bool {
        self.lock()
            .output
            .as_ref()
            .is_some_and(|tx| tx.try_send(line.to_string()).is_ok())
    }

    /// Simulate the engine process dying.
    pub fn close_output(&self) {
        self.lock().output = None;
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only happens after a test already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MockState {
    fn reply(&self, line: &str) {
        if let Some(tx) = &self.output {
            let _ = tx.try_send(line.to_string());
        }
    }
}

#[async_trait]
impl EngineChannel for MockEngine {
    async fn initialize(&mut self) -> Result<OutputLines, EngineError> {
        let mut state = self.lock();
        state.initialize_calls += 1;
        state.output = None;
        if state.failing_initializations > 0 {
            state.failing_initializations -= 1;
            return Err(EngineError::Spawn("mock engine refused to start".to_string()));
        }

        let (tx, rx) = mpsc::channel(MOCK_OUTPUT_BUFFER);
        state.output = Some(tx);
        Ok(rx)
    }

    async fn send(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        let mut state = self.lock();
        if state.output.is_none() {
            return Err(EngineError::Closed);
        }
        state.sent.push(command.clone());

        match command {
            EngineCommand::Uci if !state.silent_handshake => {
                state.reply("id name MockFish 1.0");
                state.reply("uciok");
            }
            EngineCommand::IsReady if !state.silent_handshake => state.reply("readyok"),
            EngineCommand::Stop if !state.ignore_stop => state.reply("bestmove a2a3"),
            EngineCommand::Quit => state.output = None,
            _ => {}
        }
        Ok(())
    }

    async fn dispose(&mut self) {
        let mut state = self.lock();
        state.dispose_calls += 1;
        state.output = None;
    }
}
