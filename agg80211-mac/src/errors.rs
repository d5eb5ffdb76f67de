use agg80211_core::{CoreError, MacAddress};
use thiserror::Error;

/// Result type for link-layer operations
pub type MacResult<T> = Result<T, MacError>;

/// Link-layer error types.
///
/// The first three variants are invariant violations: the operation that
/// reports them is aborted. Soft conditions such as queue overflow are not
/// errors and never surface here.
#[derive(Error, Debug)]
pub enum MacError {
    #[error("Duplicate entry: frame {id} is already in the aggregate")]
    DuplicateEntry { id: u64 },

    #[error("Length underflow: aggregate tracks {tracked} octets but entry has {entry}")]
    LengthUnderflow { tracked: u64, entry: u64 },

    #[error("No pending session: ADDBA response from {peer} does not match a pending request")]
    NoPendingSession { peer: MacAddress },

    #[error("Frame too long: {len} octets exceeds {max}")]
    FrameTooLong { len: u64, max: u64 },

    #[error("Accounting error: {0}")]
    Accounting(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),
}

impl<I: std::fmt::Debug> From<nom::Err<nom::error::Error<I>>> for MacError {
    fn from(err: nom::Err<nom::error::Error<I>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => MacError::Malformed("truncated input".to_string()),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                MacError::Malformed(format!("{:?} at {:?}", e.code, e.input))
            }

        }
    }
}
