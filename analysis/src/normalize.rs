//! Score normalization and the depth gate for published evaluations.

use serde::{Deserialize, Serialize};

use crate::types::{AnalysisScore, EngineEvaluation};
use chess::PlayerSide;

/// Logistic slope per centipawn for the evaluation bar.
pub const CP_LOGISTIC_SLOPE: f64 = 0.003_682_08;

/// Centipawn scores are clamped to this magnitude before mapping, so every
/// finite score stays strictly inside the mate band.
pub const CP_CLAMP: i32 = 1_000;

/// Forced mates map to `[MATE_BAND, 1.0)` (or the mirror for Black).
pub const MATE_BAND: f64 = 0.98;

/// How quickly longer mates drift from the edge toward the band floor.
const MATE_DECAY: f64 = 0.1;

/// Map a White-relative score to a bar position in `[0.0, 1.0]`.
///
/// 0.5 is balanced. Finite scores are a logistic curve of the clamped
/// centipawn value. Mates saturate toward the winning side, shorter mates
/// closer to the edge. Only a finished game reaches exactly 0 or 1.
pub fn bar_position(score: &AnalysisScore) -> f64 {
    match *score {
        AnalysisScore::Centipawns(cp) => {
            let cp = cp.clamp(-CP_CLAMP, CP_CLAMP) as f64;
            1.0 / (1.0 + (-CP_LOGISTIC_SLOPE * cp).exp())
        }
        AnalysisScore::Mate(moves) => {
            let distance = moves.unsigned_abs().max(1) as f64;
            let white_side = MATE_BAND + (1.0 - MATE_BAND) / (1.0 + MATE_DECAY * distance);
            if moves >= 0 {
                white_side
            } else {
                1.0 - white_side
            }
        }
        AnalysisScore::Checkmate {
            winner: PlayerSide::White,
        } => 1.0,
        AnalysisScore::Checkmate {
            winner: PlayerSide::Black,
        } => 0.0,
    }
}

/// An evaluation accepted for publication, with the depth it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedEvaluation {
    pub evaluation: EngineEvaluation,
    pub depth: u32,
}

/// Decides when a rank-1 evaluation may replace the published one.
///
/// An update passes only at or above the threshold, and only if it is at
/// least as deep as anything seen so far in the current search. Shallow
/// early iterations and late shallow lines never move the published value.
#[derive(Debug, Clone)]
pub struct DepthGate {
    threshold: u32,
    deepest_seen: Option<u32>,
    published: Option<PublishedEvaluation>,
}

impl DepthGate {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            deepest_seen: None,
            published: None,
        }
    }

    /// Offer a rank-1 evaluation. Returns true when it was published.
    pub fn offer(&mut self, depth: u32, evaluation: EngineEvaluation) -> bool {
        let deepest = self.deepest_seen.map_or(depth, |d| d.max(depth));
        self.deepest_seen = Some(deepest);

        if depth < self.threshold || depth < deepest {
            return false;
        }
        self.published = Some(PublishedEvaluation { evaluation, depth });
        true
    }

    /// Publish unconditionally if nothing has been published yet. Used when a
    /// search ends before the gate ever opened.
    pub fn promote_final(&mut self, depth: u32, evaluation: EngineEvaluation) -> bool {
        if self.published.is_some() {
            return false;
        }
        self.published = Some(PublishedEvaluation { evaluation, depth });
        true
    }

    pub fn published(&self) -> Option<&PublishedEvaluation> {
        self.published.as_ref()
    }
}
