//! Human-readable notation for engine lines.

use chess::{GameError, Position};

use crate::types::PrincipalVariation;

/// Replay `pv.moves` from `position`, filling `pv.notation` with SAN.
///
/// Stops at the first move that does not apply; the notation then covers
/// only the legal prefix and the error is returned.
pub fn enrich_line(position: &Position, pv: &mut PrincipalVariation) -> Result<(), GameError> {
    pv.notation.clear();
    let mut current = position.clone();
    for mv in &pv.moves {
        let (next, san) = current.apply_move(mv)?;
        pv.notation.push(san);
        current = next;
    }
    Ok(())
}

/// Enrich every line. Returns how many were truncated by an illegal move.
pub fn enrich_lines(position: &Position, lines: &mut [PrincipalVariation]) -> usize {
    let mut truncated = 0;
    for pv in lines.iter_mut() {
        if let Err(e) = enrich_line(position, pv) {
            truncated += 1;
            tracing::warn!(
                rank = pv.rank,
                kept = pv.notation.len(),
                total = pv.moves.len(),
                "Illegal move during enrichment: {}",
                e
            );
        }
    }
    truncated
}
