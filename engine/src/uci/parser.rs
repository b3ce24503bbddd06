use crate::{EngineInfo, Score, ScoreBound};
use chess::parse_uci_move;
use cozy_chess::Move;

use super::UciError;

/// Incoming message from UCI engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciMessage {
    Id { name: String, value: String },
    UciOk,
    ReadyOk,
    /// `mv` is `None` for `bestmove (none)` / `bestmove 0000` (no legal move).
    BestMove { mv: Option<Move>, ponder: Option<Move> },
    Info(EngineInfo),
    /// `info string ...`: free text, never analysis data.
    InfoString(String),
}

/// Coarse kind of an output line, decided from its first token only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Info,
    BestMove,
    Handshake,
    Other,
}

pub fn classify_line(line: &str) -> LineKind {
    match line.split_whitespace().next() {
        Some("info") => LineKind::Info,
        Some("bestmove") => LineKind::BestMove,
        Some("id" | "uciok" | "readyok" | "option") => LineKind::Handshake,
        _ => LineKind::Other,
    }
}

/// Parse a UCI message line
pub fn parse_uci_message(line: &str) -> Result<UciMessage, UciError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.first() {
        Some(&"uciok") => Ok(UciMessage::UciOk),
        Some(&"readyok") => Ok(UciMessage::ReadyOk),

        Some(&"id") => {
            if tokens.len() < 3 {
                return Err(UciError::MalformedMessage(line.to_string()));
            }
            let name = tokens[1].to_string();
            let value = tokens[2..].join(" ");
            Ok(UciMessage::Id { name, value })
        }

        Some(&"bestmove") => parse_bestmove_line(line, &tokens[1..]),

        Some(&"info") => {
            if tokens.get(1) == Some(&"string") {
                return Ok(UciMessage::InfoString(tokens[2..].join(" ")));
            }
            parse_info_line(line, &tokens[1..]).map(UciMessage::Info)
        }

        _ => Err(UciError::UnknownMessage(line.to_string())),
    }
}

fn parse_bestmove_line(line: &str, tokens: &[&str]) -> Result<UciMessage, UciError> {
    let Some(&best) = tokens.first() else {
        return Err(UciError::MalformedMessage(line.to_string()));
    };

    if is_null_move(best) {
        return Ok(UciMessage::BestMove {
            mv: None,
            ponder: None,
        });
    }

    let mv = parse_uci_move(best)?;
    let ponder = match tokens.get(1) {
        Some(&"ponder") => match tokens.get(2) {
            Some(token) if is_null_move(token) => None,
            Some(token) => Some(parse_uci_move(token)?),
            None => return Err(UciError::MalformedMessage(line.to_string())),
        },
        _ => None,
    };

    Ok(UciMessage::BestMove {
        mv: Some(mv),
        ponder,
    })
}

fn is_null_move(token: &str) -> bool {
    matches!(token, "(none)" | "0000")
}

/// Parse an "info" line from the engine
fn parse_info_line(line: &str, tokens: &[&str]) -> Result<EngineInfo, UciError> {
    let mut info = EngineInfo::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                info.depth = Some(parse_number(line, tokens.get(i))?);
            }
            "seldepth" => {
                i += 1;
                info.seldepth = Some(parse_number(line, tokens.get(i))?);
            }
            "time" => {
                i += 1;
                info.time_ms = Some(parse_number(line, tokens.get(i))?);
            }
            "nodes" => {
                i += 1;
                info.nodes = Some(parse_number(line, tokens.get(i))?);
            }
            "nps" => {
                i += 1;
                info.nps = Some(parse_number(line, tokens.get(i))?);
            }
            "hashfull" => {
                i += 1;
                info.hashfull = Some(parse_number(line, tokens.get(i))?);
            }
            "multipv" => {
                i += 1;
                let rank: u32 = parse_number(line, tokens.get(i))?;
                if rank == 0 {
                    return Err(UciError::MalformedMessage(line.to_string()));
                }
                info.multipv = Some(rank);
            }
            "score" => {
                i += 1;
                let kind = tokens.get(i).copied();
                i += 1;
                let value: i32 = parse_number(line, tokens.get(i))?;
                info.score = Some(match kind {
                    Some("cp") => Score::Centipawns(value),
                    Some("mate") if value == 0 => Score::Checkmated,
                    Some("mate") => Score::Mate(value),
                    _ => return Err(UciError::MalformedMessage(line.to_string())),
                });
            }
            "lowerbound" => info.bound = Some(ScoreBound::Lower),
            "upperbound" => info.bound = Some(ScoreBound::Upper),
            "currmove" => {
                i += 1;
                let token = tokens
                    .get(i)
                    .ok_or_else(|| UciError::MalformedMessage(line.to_string()))?;
                info.currmove = Some(parse_uci_move(token)?);
            }
            "pv" => {
                // Collect all moves until next keyword
                i += 1;
                while i < tokens.len() && !is_keyword(tokens[i]) {
                    info.pv.push(parse_uci_move(tokens[i])?);
                    i += 1;
                }
                continue; // Don't increment i again
            }
            "string" => break, // Rest of the line is free text
            _ => {
                // Unknown keyword or its value, skip
            }
        }
        i += 1;
    }

    Ok(info)
}

fn parse_number<T: std::str::FromStr>(line: &str, token: Option<&&str>) -> Result<T, UciError> {
    token
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| UciError::MalformedMessage(line.to_string()))
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "sbhits"
            | "cpuload"
            | "wdl"
            | "refutation"
            | "currline"
            | "string"
    )
}
