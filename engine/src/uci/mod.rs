pub mod parser;

pub use parser::{classify_line, parse_uci_message, LineKind, UciMessage};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UciError {
    #[error("Malformed UCI message: {0}")]
    MalformedMessage(String),
    #[error("Unknown UCI message: {0}")]
    UnknownMessage(String),
    #[error("Malformed move: {0}")]
    MalformedMove(String),
}

impl From<chess::MoveParseError> for UciError {
    fn from(err: chess::MoveParseError) -> Self {
        match err {
            chess::MoveParseError::Malformed(s) | chess::MoveParseError::InvalidPromotion(s) => {
                Self::MalformedMove(s)
            }
        }
    }
}
