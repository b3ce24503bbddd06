//! Analysis data model: evaluations, ranked lines, stats and best moves.

use chess::{PieceKind, PlayerSide};
use engine::{EngineInfo, Score};
use serde::{Deserialize, Serialize};

use crate::normalize;

/// Engine evaluation, always relative to the side to move in the analyzed
/// position (`perspective`). Side-independent views are derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvaluation {
    Centipawns { value: i32, perspective: PlayerSide },
    /// Positive: `perspective` mates in N. Negative: `perspective` is mated in N.
    MateIn { moves: i32, perspective: PlayerSide },
    /// The game is already over: `perspective` is checkmated.
    Checkmated { perspective: PlayerSide },
}

impl EngineEvaluation {
    pub fn from_score(score: Score, side_to_move: PlayerSide) -> Self {
        match score {
            Score::Centipawns(value) => Self::Centipawns {
                value,
                perspective: side_to_move,
            },
            Score::Mate(moves) => Self::MateIn {
                moves,
                perspective: side_to_move,
            },
            Score::Checkmated => Self::Checkmated {
                perspective: side_to_move,
            },
        }
    }

    pub fn perspective(&self) -> PlayerSide {
        match *self {
            Self::Centipawns { perspective, .. }
            | Self::MateIn { perspective, .. }
            | Self::Checkmated { perspective } => perspective,
        }
    }

    /// The same evaluation seen from White's side.
    pub fn white_relative(&self) -> AnalysisScore {
        let sign = match self.perspective() {
            PlayerSide::White => 1,
            PlayerSide::Black => -1,
        };
        match *self {
            Self::Centipawns { value, .. } => AnalysisScore::Centipawns(value.saturating_mul(sign)),
            Self::MateIn { moves, .. } => AnalysisScore::Mate(moves.saturating_mul(sign)),
            Self::Checkmated { perspective } => AnalysisScore::Checkmate {
                winner: perspective.opponent(),
            },
        }
    }

    /// Bar position in `[0.0, 1.0]`; 0.5 is balanced, 1.0 favors White.
    pub fn bar_position(&self) -> f64 {
        normalize::bar_position(&self.white_relative())
    }
}

/// White-relative engine score, for display and comparison.
///
/// Centipawns: positive = White is better.
/// Mate: positive N = White mates in N moves, negative N = Black mates in N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisScore {
    Centipawns(i32),
    Mate(i32),
    Checkmate { winner: PlayerSide },
}

impl AnalysisScore {
    pub fn display(&self) -> String {
        match self {
            Self::Centipawns(cp) => format!("{:+.2}", *cp as f64 / 100.0),
            Self::Mate(m) => {
                if *m > 0 {
                    format!("+M{}", m)
                } else {
                    format!("-M{}", m.abs())
                }
            }
            Self::Checkmate {
                winner: PlayerSide::White,
            } => "1-0".to_string(),
            Self::Checkmate {
                winner: PlayerSide::Black,
            } => "0-1".to_string(),
        }
    }
}

impl std::fmt::Display for AnalysisScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// One ranked candidate line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalVariation {
    /// 1 is the best line.
    pub rank: u32,
    pub depth: u32,
    pub evaluation: EngineEvaluation,
    /// Coordinate moves as sent by the engine.
    pub moves: Vec<String>,
    /// SAN for a prefix of `moves`; filled in once the search concludes.
    pub notation: Vec<String>,
}

/// Search statistics from the latest info line that carried any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub depth: u32,
    pub selective_depth: Option<u32>,
    pub nodes: u64,
    pub nodes_per_second: u64,
    pub elapsed_ms: Option<u64>,
    pub hash_full_per_mille: Option<u32>,
}

impl EngineStats {
    /// Build the next stats snapshot from an info record. Fields the record
    /// leaves out keep their previous value instead of dropping to zero.
    pub fn merged(previous: Option<&EngineStats>, info: &EngineInfo) -> Option<EngineStats> {
        if !info.has_stats() {
            return None;
        }
        let base = previous.cloned().unwrap_or_default();
        Some(EngineStats {
            depth: info.depth.unwrap_or(base.depth),
            selective_depth: info.seldepth.or(base.selective_depth),
            nodes: info.nodes.unwrap_or(base.nodes),
            nodes_per_second: info.nps.unwrap_or(base.nodes_per_second),
            elapsed_ms: info.time_ms.or(base.elapsed_ms),
            hash_full_per_mille: info.hashfull.or(base.hash_full_per_mille),
        })
    }
}

/// The engine's final answer for a concluded search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestMove {
    pub mv: String,
    pub promotion: Option<PieceKind>,
    pub ponder: Option<String>,
    /// SAN of `mv` in the analyzed position.
    pub notation: Option<String>,
}
