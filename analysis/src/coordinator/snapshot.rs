use chess::PlayerSide;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AnalysisScore, BestMove, EngineEvaluation, EngineStats, PrincipalVariation};

/// Lifecycle of the engine channel as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum EnginePhase {
    Uninitialized,
    Initializing { attempt: u32 },
    Ready,
    Analyzing,
    Failed { reason: String },
}

impl EnginePhase {
    pub fn is_available(&self) -> bool {
        matches!(
            self,
            Self::Initializing { .. } | Self::Ready | Self::Analyzing
        )
    }
}

/// Complete coordinator state, sent to subscribers after every change.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSnapshot {
    pub phase: EnginePhase,
    pub engine_name: Option<String>,
    pub session: Option<SessionSnapshot>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    /// FEN of the analyzed position (after any requested moves).
    pub fen: String,
    pub side_to_move: PlayerSide,
    /// Depth-gated evaluation, relative to `side_to_move`.
    pub evaluation: Option<EngineEvaluation>,
    pub evaluation_depth: Option<u32>,
    /// The gated evaluation seen from White.
    pub score: Option<AnalysisScore>,
    pub bar_position: Option<f64>,
    pub lines: Vec<PrincipalVariation>,
    pub best_move: Option<BestMove>,
    pub stats: Option<EngineStats>,
    pub concluded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes_phase_and_score() {
        let snapshot = AnalysisSnapshot {
            phase: EnginePhase::Initializing { attempt: 2 },
            engine_name: Some("Stockfish 17".to_string()),
            session: Some(SessionSnapshot {
                id: Uuid::nil(),
                fen: chess::START_FEN.to_string(),
                side_to_move: PlayerSide::White,
                evaluation: Some(EngineEvaluation::MateIn {
                    moves: 2,
                    perspective: PlayerSide::White,
                }),
                evaluation_depth: Some(14),
                score: Some(AnalysisScore::Mate(2)),
                bar_position: Some(0.99),
                lines: Vec::new(),
                best_move: None,
                stats: None,
                concluded: false,
            }),
            last_error: None,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["phase"]["phase"], "initializing");
        assert_eq!(json["phase"]["attempt"], 2);
        assert_eq!(json["session"]["evaluation"]["kind"], "mate_in");
        assert_eq!(json["session"]["evaluation"]["moves"], 2);
        assert_eq!(json["session"]["evaluation_depth"], 14);
    }

    #[test]
    fn test_available_phases() {
        assert!(!EnginePhase::Uninitialized.is_available());
        assert!(EnginePhase::Initializing { attempt: 1 }.is_available());
        assert!(EnginePhase::Analyzing.is_available());
        assert!(!EnginePhase::Failed {
            reason: "gone".to_string()
        }
        .is_available());
    }
}
