//! Plain-text rendering of analysis snapshots.

use analysis::{AnalysisSnapshot, EnginePhase, PrincipalVariation, SessionSnapshot};

const BAR_WIDTH: usize = 20;

pub fn render_text(snapshot: &AnalysisSnapshot) -> String {
    let mut out = String::new();
    let engine = snapshot.engine_name.as_deref().unwrap_or("engine");

    let Some(session) = &snapshot.session else {
        out.push_str(&format!("[{}] {}", phase_label(&snapshot.phase), engine));
        if let Some(error) = &snapshot.last_error {
            out.push_str(&format!("\n  error: {}", error));
        }
        return out;
    };

    out.push_str(&format!(
        "[{}] {}  {}  {}  {}\n",
        phase_label(&snapshot.phase),
        headline(session),
        session
            .bar_position
            .map(render_bar)
            .unwrap_or_else(|| render_bar(0.5)),
        engine,
        session.fen,
    ));

    for line in &session.lines {
        out.push_str(&render_line(line));
        out.push('\n');
    }

    if let Some(best) = &session.best_move {
        out.push_str(&format!("best: {}", best.notation.as_deref().unwrap_or(&best.mv)));
        if let Some(ponder) = &best.ponder {
            out.push_str(&format!(" (ponder {})", ponder));
        }
        out.push('\n');
    }
    if let Some(stats) = &session.stats {
        out.push_str(&format!(
            "nodes {}  nps {}  seldepth {}\n",
            stats.nodes,
            stats.nodes_per_second,
            stats
                .selective_depth
                .map_or_else(|| "-".to_string(), |d| d.to_string()),
        ));
    }
    out.trim_end().to_string()
}

fn phase_label(phase: &EnginePhase) -> String {
    match phase {
        EnginePhase::Uninitialized => "idle".to_string(),
        EnginePhase::Initializing { attempt } => format!("starting #{}", attempt),
        EnginePhase::Ready => "done".to_string(),
        EnginePhase::Analyzing => "analyzing".to_string(),
        EnginePhase::Failed { .. } => "failed".to_string(),
    }
}

fn headline(session: &SessionSnapshot) -> String {
    match (session.score, session.evaluation_depth) {
        (Some(score), Some(depth)) => format!("{:>6} d{}", score.display(), depth),
        _ => format!("{:>6} d-", "..."),
    }
}

fn render_line(line: &PrincipalVariation) -> String {
    // Notation only exists once the search has concluded.
    let moves = if line.notation.is_empty() {
        line.moves.join(" ")
    } else {
        line.notation.join(" ")
    };
    format!(
        "{:>2}. {:>6} (d{})  {}",
        line.rank,
        line.evaluation.white_relative().display(),
        line.depth,
        moves
    )
}

/// `[#####---------------]`, filled from the left by White's share.
pub fn render_bar(position: f64) -> String {
    let filled = (position.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis::{AnalysisScore, BestMove, EngineEvaluation};
    use chess::PlayerSide;

    fn session() -> SessionSnapshot {
        SessionSnapshot {
            id: uuid::Uuid::nil(),
            fen: chess::START_FEN.to_string(),
            side_to_move: PlayerSide::White,
            evaluation: Some(EngineEvaluation::Centipawns {
                value: 35,
                perspective: PlayerSide::White,
            }),
            evaluation_depth: Some(20),
            score: Some(AnalysisScore::Centipawns(35)),
            bar_position: Some(0.53),
            lines: vec![PrincipalVariation {
                rank: 1,
                depth: 20,
                evaluation: EngineEvaluation::Centipawns {
                    value: 35,
                    perspective: PlayerSide::White,
                },
                moves: vec!["e2e4".to_string(), "e7e5".to_string()],
                notation: vec!["e4".to_string(), "e5".to_string()],
            }],
            best_move: Some(BestMove {
                mv: "e2e4".to_string(),
                promotion: None,
                ponder: Some("e7e5".to_string()),
                notation: Some("e4".to_string()),
            }),
            stats: None,
            concluded: true,
        }
    }

    #[test]
    fn test_render_bar_edges() {
        assert_eq!(render_bar(0.0), format!("[{}]", "-".repeat(BAR_WIDTH)));
        assert_eq!(render_bar(1.0), format!("[{}]", "#".repeat(BAR_WIDTH)));
        assert_eq!(render_bar(0.5).matches('#').count(), BAR_WIDTH / 2);
    }

    #[test]
    fn test_render_concluded_session() {
        let snapshot = AnalysisSnapshot {
            phase: EnginePhase::Ready,
            engine_name: Some("MockFish".to_string()),
            session: Some(session()),
            last_error: None,
        };
        let text = render_text(&snapshot);
        assert!(text.starts_with("[done]  +0.35 d20"));
        assert!(text.contains(" 1.  +0.35 (d20)  e4 e5"));
        assert!(text.contains("best: e4 (ponder e7e5)"));
    }

    #[test]
    fn test_render_uses_coordinates_before_enrichment() {
        let mut session = session();
        session.lines[0].notation.clear();
        session.score = None;
        session.evaluation_depth = None;
        let snapshot = AnalysisSnapshot {
            phase: EnginePhase::Analyzing,
            engine_name: None,
            session: Some(session),
            last_error: None,
        };
        let text = render_text(&snapshot);
        assert!(text.contains("e2e4 e7e5"));
        assert!(text.contains("... d-"));
    }

    #[test]
    fn test_render_without_session_shows_error() {
        let snapshot = AnalysisSnapshot {
            phase: EnginePhase::Failed {
                reason: "not found".to_string(),
            },
            engine_name: None,
            session: None,
            last_error: Some("Engine executable not found".to_string()),
        };
        let text = render_text(&snapshot);
        assert!(text.starts_with("[failed] engine"));
        assert!(text.contains("error: Engine executable not found"));
    }
}
