//! Standard Algebraic Notation (SAN) formatting.

use cozy_chess::{Board, GameStatus, Move, Piece};

use crate::uci::{file_char, rank_char};

/// Format a legal move as SAN (`e4`, `Nbd7`, `exd6`, `O-O`, `e8=Q+`, `Qh4#`).
///
/// The move must be legal on `board` and in cozy-chess form, i.e. castling is
/// encoded as the king capturing its own rook.
pub fn format_san(board: &Board, mv: Move) -> String {
    let Some(piece) = board.piece_on(mv.from) else {
        return crate::format_uci_move(mv);
    };
    let mover = board.side_to_move();

    let mut san = if piece == Piece::King && board.color_on(mv.to) == Some(mover) {
        if (mv.to.file() as u8) > (mv.from.file() as u8) {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        }
    } else {
        piece_move_san(board, mv, piece)
    };

    let mut after = board.clone();
    after.play_unchecked(mv);
    if !after.checkers().is_empty() {
        san.push(if after.status() == GameStatus::Won {
            '#'
        } else {
            '+'
        });
    }

    san
}

fn piece_move_san(board: &Board, mv: Move, piece: Piece) -> String {
    let mut san = String::new();
    let is_capture = board.color_on(mv.to).is_some()
        || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

    if piece == Piece::Pawn {
        if is_capture {
            san.push(file_char(mv.from.file()));
        }
    } else {
        san.push(crate::PieceKind::from(piece).san_letter());
        san.push_str(&disambiguation(board, mv, piece));
    }

    if is_capture {
        san.push('x');
    }
    san.push(file_char(mv.to.file()));
    san.push(rank_char(mv.to.rank()));

    if let Some(promo) = mv.promotion {
        san.push('=');
        san.push(crate::PieceKind::from(promo).san_letter());
    }

    san
}

/// Origin qualifier needed when another piece of the same kind can reach the
/// same square: file if that is unique, else rank, else the full square.
fn disambiguation(board: &Board, mv: Move, piece: Piece) -> String {
    let mut rivals = Vec::new();
    board.generate_moves(|mvs| {
        if mvs.piece == piece {
            rivals.extend(
                mvs.into_iter()
                    .filter(|other| other.to == mv.to && other.from != mv.from),
            );
        }
        false
    });

    if rivals.is_empty() {
        return String::new();
    }

    let shares_file = rivals.iter().any(|r| r.from.file() == mv.from.file());
    let shares_rank = rivals.iter().any(|r| r.from.rank() == mv.from.rank());

    match (shares_file, shares_rank) {
        (false, _) => file_char(mv.from.file()).to_string(),
        (true, false) => rank_char(mv.from.rank()).to_string(),
        (true, true) => format!(
            "{}{}",
            file_char(mv.from.file()),
            rank_char(mv.from.rank())
        ),
    }
}
