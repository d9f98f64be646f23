//! Result types for kernel operations

use bigdecimal::BigDecimal;

use crate::domain::{Order, Trade};

/// Outcome of a submission: the authoritative post-match order and the
/// trades executed as a direct consequence of it, in execution order.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub order: Order,
    pub trades: Vec<Trade>,
}

impl SubmitReceipt {
    pub fn has_trades(&self) -> bool {
        !self.trades.is_empty()
    }

    /// Total quantity executed by this submission.
    pub fn executed_quantity(&self) -> BigDecimal {
        self.trades
            .iter()
            .fold(BigDecimal::from(0), |acc, trade| acc + &trade.quantity)
    }
}

/// What boot-time recovery rebuilt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryStats {
    pub orders: usize,
    pub instruments: usize,
}
