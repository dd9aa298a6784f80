use thiserror::Error;

#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid string length at byte {0}")]
    InvalidStringLength(usize),

    #[error("unexpected character {0:?} at byte {1}")]
    UnexpectedChar(char, usize),

    #[error("dictionary key is not a byte string at byte {0}")]
    NonStringKey(usize),

    #[error("{0} bytes of trailing data after value")]
    TrailingData(usize),

    #[error("nesting too deep")]
    NestingTooDeep,
}
