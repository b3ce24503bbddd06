//! Per-position analysis state.

use chess::{format_uci_move, PieceKind, PlayerSide, Position};
use cozy_chess::{GameStatus, Move};
use engine::EngineInfo;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::PvAggregator;
use crate::enrich;
use crate::normalize::{DepthGate, PublishedEvaluation};
use crate::types::{BestMove, EngineEvaluation, EngineStats, PrincipalVariation};

/// A position as the caller asked for it: a FEN (or `startpos`) plus moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRequest {
    pub fen: String,
    pub moves: Vec<String>,
}

impl PositionRequest {
    pub fn new(fen: impl Into<String>, moves: Vec<String>) -> Self {
        Self {
            fen: fen.into(),
            moves,
        }
    }

    /// Resolve the request into the position that will be analyzed.
    pub fn resolve(&self) -> Result<Position, chess::GameError> {
        Position::from_fen_and_moves(&self.fen, &self.moves)
    }
}

/// What an info record changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoOutcome {
    pub stats_updated: bool,
    pub line_updated: bool,
    pub evaluation_published: bool,
}

impl InfoOutcome {
    pub fn changed(&self) -> bool {
        self.stats_updated || self.line_updated || self.evaluation_published
    }
}

/// Everything known about one submitted position. Replaced wholesale when a
/// new position is submitted, so nothing leaks from one search to the next.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    id: Uuid,
    request: PositionRequest,
    position: Position,
    lines: PvAggregator,
    gate: DepthGate,
    stats: Option<EngineStats>,
    best_move: Option<BestMove>,
    concluded: bool,
}

impl AnalysisSession {
    pub fn new(request: PositionRequest, position: Position, min_publish_depth: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            position,
            lines: PvAggregator::new(),
            gate: DepthGate::new(min_publish_depth),
            stats: None,
            best_move: None,
            concluded: false,
        }
    }

    /// Fold one info record into the session.
    ///
    /// Bounded scores update statistics only. Fields a record omits fall back
    /// to the previous line at the same rank.
    pub fn apply_info(&mut self, info: &EngineInfo) -> InfoOutcome {
        let mut outcome = InfoOutcome::default();
        if self.concluded {
            return outcome;
        }

        if let Some(stats) = EngineStats::merged(self.stats.as_ref(), info) {
            outcome.stats_updated = self.stats.as_ref() != Some(&stats);
            self.stats = Some(stats);
        }

        if info.bound.is_some() {
            tracing::trace!(depth = ?info.depth, "Skipping bounded score");
            return outcome;
        }
        if info.score.is_none() && info.pv.is_empty() {
            return outcome;
        }

        let rank = info.rank();
        let previous = self.lines.get(rank);
        let evaluation = match info.score {
            Some(score) => EngineEvaluation::from_score(score, self.side_to_move()),
            None => match previous {
                Some(line) => line.evaluation,
                None => return outcome,
            },
        };
        let depth = info
            .depth
            .or_else(|| previous.map(|line| line.depth))
            .unwrap_or(0);
        let moves = if info.pv.is_empty() {
            previous.map(|line| line.moves.clone()).unwrap_or_default()
        } else {
            info.pv.iter().map(|mv| format_uci_move(*mv)).collect()
        };

        self.lines.upsert(PrincipalVariation {
            rank,
            depth,
            evaluation,
            moves,
            notation: Vec::new(),
        });
        outcome.line_updated = true;

        if rank == 1 {
            outcome.evaluation_published = self.gate.offer(depth, evaluation);
        }
        outcome
    }

    /// Close the search: record the best move, add notation to every line
    /// and promote the final evaluation if the gate never opened.
    ///
    /// Returns the number of lines whose notation was truncated.
    pub fn conclude(&mut self, best: Option<Move>, ponder: Option<Move>) -> usize {
        self.concluded = true;

        self.best_move = best.map(|mv| {
            let uci = format_uci_move(mv);
            let notation = match self.position.apply_move(&uci) {
                Ok((_, san)) => Some(san),
                Err(e) => {
                    tracing::warn!("Engine best move {} does not apply: {}", uci, e);
                    None
                }
            };
            BestMove {
                mv: uci,
                promotion: mv.promotion.map(PieceKind::from),
                ponder: ponder.map(format_uci_move),
                notation,
            }
        });

        let truncated = enrich::enrich_lines(&self.position, self.lines.lines_mut());

        let final_line = self
            .lines
            .best()
            .map(|line| (line.depth, line.evaluation));
        match final_line {
            Some((depth, evaluation)) => {
                self.gate.promote_final(depth, evaluation);
            }
            None if self.position.status() == GameStatus::Won => {
                let evaluation = EngineEvaluation::Checkmated {
                    perspective: self.side_to_move(),
                };
                self.gate.promote_final(0, evaluation);
            }
            None => {}
        }
        truncated
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &PositionRequest {
        &self.request
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn side_to_move(&self) -> PlayerSide {
        self.position.side_to_move()
    }

    pub fn lines(&self) -> &[PrincipalVariation] {
        self.lines.lines()
    }

    pub fn best_line(&self) -> Option<&PrincipalVariation> {
        self.lines.best()
    }

    pub fn published(&self) -> Option<&PublishedEvaluation> {
        self.gate.published()
    }

    pub fn stats(&self) -> Option<&EngineStats> {
        self.stats.as_ref()
    }

    pub fn best_move(&self) -> Option<&BestMove> {
        self.best_move.as_ref()
    }

    pub fn is_concluded(&self) -> bool {
        self.concluded
    }
}
