pub mod channel;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod stockfish;
pub mod uci;

pub use channel::{EngineChannel, EngineError, OutputLines};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockEngine;
pub use stockfish::{StockfishConfig, StockfishEngine};
pub use uci::{classify_line, parse_uci_message, LineKind, UciError, UciMessage};

use cozy_chess::Move;

/// Commands sent to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Uci,
    IsReady,
    /// `fen` may be `startpos`; `moves` are coordinate moves played after it.
    SetPosition { fen: String, moves: Vec<String> },
    SetOption { name: String, value: Option<String> },
    Go(GoParams),
    Stop,
    Quit,
}

impl EngineCommand {
    /// Encode the command as a single UCI line, without the trailing newline.
    pub fn to_uci(&self) -> String {
        match self {
            Self::Uci => "uci".to_string(),
            Self::IsReady => "isready".to_string(),
            Self::SetPosition { fen, moves } => {
                let mut cmd = if fen == "startpos" {
                    "position startpos".to_string()
                } else {
                    format!("position fen {}", fen)
                };
                if !moves.is_empty() {
                    cmd.push_str(" moves");
                    for mv in moves {
                        cmd.push(' ');
                        cmd.push_str(mv);
                    }
                }
                cmd
            }
            Self::SetOption { name, value } => match value {
                Some(val) => format!("setoption name {} value {}", name, val),
                None => format!("setoption name {}", name),
            },
            Self::Go(params) => params.to_uci(),
            Self::Stop => "stop".to_string(),
            Self::Quit => "quit".to_string(),
        }
    }
}

/// Parameters for the "go" command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoParams {
    pub movetime: Option<u64>, // Move time in milliseconds
    pub depth: Option<u32>,    // Search depth
    pub infinite: bool,        // Search until "stop"
}

impl GoParams {
    pub fn to_uci(&self) -> String {
        if self.infinite {
            "go infinite".to_string()
        } else if let Some(depth) = self.depth {
            format!("go depth {}", depth)
        } else if let Some(movetime) = self.movetime {
            format!("go movetime {}", movetime)
        } else {
            "go movetime 1000".to_string() // Default 1 second
        }
    }
}

/// One decoded `info` line. Every field is optional; absent keys stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub score: Option<Score>,
    pub bound: Option<ScoreBound>,
    pub pv: Vec<Move>, // Principal variation
    pub multipv: Option<u32>,
    pub currmove: Option<Move>,
    pub hashfull: Option<u32>,
    pub nps: Option<u64>,
}

impl EngineInfo {
    /// Rank of the line this record describes. `multipv` absent means rank 1.
    pub fn rank(&self) -> u32 {
        self.multipv.unwrap_or(1).max(1)
    }

    /// True when the record carries any search statistics.
    pub fn has_stats(&self) -> bool {
        self.depth.is_some()
            || self.seldepth.is_some()
            || self.nodes.is_some()
            || self.nps.is_some()
            || self.time_ms.is_some()
            || self.hashfull.is_some()
    }
}

/// Score as reported by the engine, relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Positive: side to move mates in N. Negative: side to move is mated in N.
    Mate(i32),
    /// `score mate 0`: the side to move is already checkmated.
    Checkmated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Lower,
    Upper,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_command() {
        let cmd = EngineCommand::SetPosition {
            fen: "startpos".to_string(),
            moves: vec!["e2e4".to_string(), "e7e5".to_string()],
        };
        assert_eq!(cmd.to_uci(), "position startpos moves e2e4 e7e5");

        let cmd = EngineCommand::SetPosition {
            fen: "8/8/8/8/8/8/8/K1k5 w - - 0 1".to_string(),
            moves: vec![],
        };
        assert_eq!(cmd.to_uci(), "position fen 8/8/8/8/8/8/8/K1k5 w - - 0 1");
    }

    #[test]
    fn test_go_command() {
        let infinite = GoParams {
            infinite: true,
            ..Default::default()
        };
        assert_eq!(infinite.to_uci(), "go infinite");

        let depth = GoParams {
            depth: Some(18),
            ..Default::default()
        };
        assert_eq!(EngineCommand::Go(depth).to_uci(), "go depth 18");

        let movetime = GoParams {
            movetime: Some(250),
            ..Default::default()
        };
        assert_eq!(movetime.to_uci(), "go movetime 250");
    }

    #[test]
    fn test_setoption_command() {
        let cmd = EngineCommand::SetOption {
            name: "MultiPV".to_string(),
            value: Some("3".to_string()),
        };
        assert_eq!(cmd.to_uci(), "setoption name MultiPV value 3");

        let cmd = EngineCommand::SetOption {
            name: "Clear Hash".to_string(),
            value: None,
        };
        assert_eq!(cmd.to_uci(), "setoption name Clear Hash");
    }

    #[test]
    fn test_info_rank_defaults_to_one() {
        assert_eq!(EngineInfo::default().rank(), 1);
        let info = EngineInfo {
            multipv: Some(3),
            ..Default::default()
        };
        assert_eq!(info.rank(), 3);
    }
}
