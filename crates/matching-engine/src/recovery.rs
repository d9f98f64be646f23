//! Boot-time recovery
//!
//! Rebuilds the in-memory books from the durable store. The persisted
//! state was reached only through committed durability units, each of
//! which preserves the non-crossing invariant, so recovery performs no
//! matching: every open limit order is inserted through the normal book
//! insertion path, in creation order.

use tracing::{info, warn};

use crate::book::BookEntry;
use crate::exchange::Exchange;
use crate::result::RecoveryStats;
use crate::store::StoreError;

impl Exchange {
    /// Rebuild books from the durable store. Call before accepting
    /// arrivals; a failure here is fatal to startup.
    pub async fn recover(&self) -> Result<RecoveryStats, StoreError> {
        let open = self.store_ref().load_open().await?;

        let mut stats = RecoveryStats::default();
        for order in open {
            // load_open only returns resting-eligible rows; skip anything
            // else rather than poisoning the book
            let Some(entry) = BookEntry::from_order(&order) else {
                warn!(order_id = %order.id, "Skipping non-restable row during recovery");
                continue;
            };
            let book = self.book(&order.instrument);
            book.with_state(|state| state.insert(order.side, entry));
            stats.orders += 1;
        }
        stats.instruments = self.instruments().len();

        for symbol in self.instruments() {
            let book = self.book(&symbol);
            if book.with_state(|state| state.is_crossed()) {
                warn!(
                    instrument = %symbol,
                    "Recovered book is crossed; durable state was not quiescent"
                );
            }
        }

        info!(
            orders = stats.orders,
            instruments = stats.instruments,
            "Recovery complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewOrder;
    use crate::store::MemoryOrderStore;
    use bigdecimal::BigDecimal;
    use common::{Side, Symbol};
    use config::MatchingConfig;
    use std::str::FromStr;
    use std::sync::Arc;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_restart_rebuilds_equivalent_books() {
        let store: Arc<dyn crate::store::OrderStore> = Arc::new(MemoryOrderStore::new());
        let exchange = Exchange::new(Arc::clone(&store), MatchingConfig::default());

        // seed a book with fills, rests and a cancellation
        exchange
            .submit(NewOrder::limit("m1", "BTC-USD", Side::Sell, dec("100"), dec("5")))
            .await
            .unwrap();
        exchange
            .submit(NewOrder::limit("m2", "BTC-USD", Side::Sell, dec("102"), dec("7")))
            .await
            .unwrap();
        let partially = exchange
            .submit(NewOrder::limit("t1", "BTC-USD", Side::Buy, dec("101"), dec("8")))
            .await
            .unwrap();
        let doomed = exchange
            .submit(NewOrder::limit("t2", "BTC-USD", Side::Buy, dec("90"), dec("2")))
            .await
            .unwrap();
        exchange.cancel(doomed.order.id, None).await.unwrap();
        exchange
            .submit(NewOrder::limit("m3", "ETH-USD", Side::Sell, dec("4000"), dec("1")))
            .await
            .unwrap();

        // sanity: the partial buy rests with its residue
        assert_eq!(partially.order.remaining, dec("3"));

        // "restart": a fresh kernel over the same durable store
        let reborn = Exchange::new(Arc::clone(&store), MatchingConfig::default());
        let stats = reborn.recover().await.unwrap();
        assert_eq!(stats.orders, 3);
        assert_eq!(stats.instruments, 2);

        for symbol in ["BTC-USD", "ETH-USD"] {
            let symbol = Symbol::new(symbol);
            let before = exchange.book_snapshot(&symbol, None);
            let after = reborn.book_snapshot(&symbol, None);
            assert_eq!(before.bids, after.bids, "{symbol} bids");
            assert_eq!(before.asks, after.asks, "{symbol} asks");
        }

        // the rebuilt book keeps matching correctly
        let receipt = reborn
            .submit(NewOrder::limit("t3", "BTC-USD", Side::Buy, dec("102"), dec("7")))
            .await
            .unwrap();
        assert_eq!(receipt.trades.len(), 1);
        assert_eq!(receipt.trades[0].price, dec("102"));
        assert_eq!(receipt.trades[0].quantity, dec("7"));
    }

    #[tokio::test]
    async fn test_recovery_preserves_time_priority() {
        let store: Arc<dyn crate::store::OrderStore> = Arc::new(MemoryOrderStore::new());
        let exchange = Exchange::new(Arc::clone(&store), MatchingConfig::default());

        let first = exchange
            .submit(NewOrder::limit("m1", "BTC-USD", Side::Sell, dec("100"), dec("5")))
            .await
            .unwrap();
        let second = exchange
            .submit(NewOrder::limit("m2", "BTC-USD", Side::Sell, dec("100"), dec("5")))
            .await
            .unwrap();

        let reborn = Exchange::new(Arc::clone(&store), MatchingConfig::default());
        reborn.recover().await.unwrap();

        let receipt = reborn
            .submit(NewOrder::limit("taker", "BTC-USD", Side::Buy, dec("100"), dec("6")))
            .await
            .unwrap();
        assert_eq!(receipt.trades.len(), 2);
        assert_eq!(receipt.trades[0].sell_order_id, first.order.id);
        assert_eq!(receipt.trades[1].sell_order_id, second.order.id);
    }

    #[tokio::test]
    async fn test_recovery_of_empty_store() {
        let store = Arc::new(MemoryOrderStore::new());
        let exchange = Exchange::new(store, MatchingConfig::default());
        let stats = exchange.recover().await.unwrap();
        assert_eq!(stats.orders, 0);
        assert_eq!(stats.instruments, 0);
    }
}
