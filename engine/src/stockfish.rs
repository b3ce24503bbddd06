use crate::channel::{EngineChannel, EngineError, OutputLines};
use crate::EngineCommand;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const OUTPUT_BUFFER: usize = 256;
const QUIT_GRACE: Duration = Duration::from_secs(1);

/// Configuration for engine performance tuning.
#[derive(Debug, Clone, Default)]
pub struct StockfishConfig {
    /// Explicit executable path. Falls back to `CHESSLENS_ENGINE_PATH`, then
    /// to a search of common install locations.
    pub path: Option<PathBuf>,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
    /// Tag added to log lines, useful when several engines run at once.
    pub label: Option<String>,
}

/// A Stockfish (or any UCI engine) child process.
pub struct StockfishEngine {
    config: StockfishConfig,
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
}

impl StockfishEngine {
    pub fn new(config: StockfishConfig) -> Self {
        Self {
            config,
            process: None,
            stdin: None,
            reader: None,
        }
    }

    fn label(&self) -> &str {
        self.config.label.as_deref().unwrap_or("engine")
    }

    fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.path {
            return Some(path.clone());
        }
        if let Ok(path) = std::env::var("CHESSLENS_ENGINE_PATH") {
            return Some(PathBuf::from(path));
        }
        find_stockfish_path()
    }
}

#[async_trait]
impl EngineChannel for StockfishEngine {
    #[tracing::instrument(level = "info", skip(self), fields(label = %self.label()))]
    async fn initialize(&mut self) -> Result<OutputLines, EngineError> {
        self.dispose().await;

        let path = self.resolve_path().ok_or(EngineError::NotFound)?;
        tracing::info!("Spawning engine at {:?}", path);

        let mut process = tokio::process::Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to spawn engine: {}", e);
                EngineError::Spawn(e.to_string())
            })?;

        let stdin = process.stdin.take().ok_or(EngineError::NoStdin)?;
        let stdout = process.stdout.take().ok_or(EngineError::NoStdout)?;

        let (line_tx, line_rx) = mpsc::channel::<String>(OUTPUT_BUFFER);
        let label = self.label().to_string();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        tracing::trace!(%label, "UCI << {}", trimmed);
                        if line_tx.send(trimmed.to_string()).await.is_err() {
                            tracing::debug!(%label, "Output receiver dropped");
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::warn!(%label, "Engine stdout EOF - engine closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(%label, "Error reading from engine stdout: {}", e);
                        break;
                    }
                }
            }
            tracing::info!(%label, "Output reader task exiting");
        });

        self.process = Some(process);
        self.stdin = Some(stdin);
        self.reader = Some(reader);
        Ok(line_rx)
    }

    async fn send(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        let stdin = self.stdin.as_mut().ok_or(EngineError::Closed)?;
        let line = command.to_uci();
        tracing::trace!(label = %self.config.label.as_deref().unwrap_or("engine"), "UCI >> {}", line);

        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn dispose(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.write_all(b"quit\n").await;
            let _ = stdin.flush().await;
        }
        if let Some(mut process) = self.process.take() {
            if tokio::time::timeout(QUIT_GRACE, process.wait()).await.is_err() {
                tracing::warn!("Engine did not exit after quit, killing it");
                let _ = process.kill().await;
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    fn startup_options(&self) -> Vec<(String, String)> {
        let mut options = Vec::new();
        if let Some(threads) = self.config.threads {
            options.push(("Threads".to_string(), threads.clamp(1, 16).to_string()));
        }
        if let Some(hash_mb) = self.config.hash_mb {
            options.push(("Hash".to_string(), hash_mb.clamp(1, 2048).to_string()));
        }
        options
    }
}

/// Find Stockfish executable in common locations
pub fn find_stockfish_path() -> Option<PathBuf> {
    let paths = [
        "/usr/local/bin/stockfish",
        "/usr/bin/stockfish",
        "/opt/homebrew/bin/stockfish",
        "/usr/games/stockfish",
    ];

    if let Some(found) = paths.iter().map(Path::new).find(|p| p.exists()) {
        return Some(found.to_path_buf());
    }

    // In PATH
    std::env::var_os("PATH").and_then(|path| {
        std::env::split_paths(&path)
            .map(|dir| dir.join("stockfish"))
            .find(|candidate| candidate.exists())
    })
}
