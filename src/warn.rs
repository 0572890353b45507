use std::fmt;

use crate::bits::Position;

/// A recoverable anomaly encountered while decoding.
///
/// Warnings never abort the parse; they cover the stream shapes the format
/// tolerates (stray tokens at the top level, BLOCKINFO oddities) without
/// letting them pass silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub position: Position,
    pub block_id: Option<u32>,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.position)?;
        if let Some(id) = self.block_id {
            write!(f, " (in block {id})")?;
        }
        Ok(())
    }
}

/// Receives the non-fatal anomalies of a parse.
///
/// When no sink is installed the reader emits warnings through
/// `tracing::warn!` instead.
pub trait WarningSink {
    fn report(&mut self, warning: Warning);
}

/// A sink that retains every warning, in order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub warnings: Vec<Warning>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl WarningSink for CollectingSink {
    fn report(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}
