use thiserror::Error;

use crate::bits::Position;

/// Result alias for bitstream decoding.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal bitstream decoding failure.
///
/// Exactly two kinds exist: a violation of the wire-format contract and a
/// read past the end of the buffer. Both carry the bit position where the
/// failure was detected and, when known, the id of the enclosing block.
/// A fatal failure abandons the parse; no partial result is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("malformed bitstream at {position}: {message}")]
    Malformed {
        message: String,
        position: Position,
        block_id: Option<u32>,
    },

    #[error("read past end of stream at {position}")]
    OutOfBounds {
        position: Position,
        block_id: Option<u32>,
    },
}

impl Error {
    pub(crate) fn malformed(message: impl Into<String>, position: Position) -> Self {
        Error::Malformed {
            message: message.into(),
            position,
            block_id: None,
        }
    }

    pub(crate) fn out_of_bounds(position: Position) -> Self {
        Error::OutOfBounds {
            position,
            block_id: None,
        }
    }

    /// The bit position at which the failure was detected.
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Error::Malformed { position, .. } | Error::OutOfBounds { position, .. } => *position,
        }
    }

    /// The id of the innermost block that was being decoded, if any.
    #[must_use]
    pub fn block_id(&self) -> Option<u32> {
        match self {
            Error::Malformed { block_id, .. } | Error::OutOfBounds { block_id, .. } => *block_id,
        }
    }

    /// Attach the enclosing block id unless an inner block already did.
    pub(crate) fn in_block(mut self, id: u32) -> Self {
        match &mut self {
            Error::Malformed { block_id, .. } | Error::OutOfBounds { block_id, .. } => {
                block_id.get_or_insert(id);
            }
        }
        self
    }
}
