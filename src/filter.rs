//! Selects the transactions of a block that touch a watched wallet.

use crate::registry::Snapshot;
use crate::types::Transaction;

/// Whether the sender or the recipient of `tx` is subscribed.
pub fn matches(tx: &Transaction, snapshot: &Snapshot) -> bool {
    snapshot.contains_key(&tx.from) || tx.to.map_or(false, |to| snapshot.contains_key(&to))
}

/// Matching transactions in block order.
pub fn matching_transactions<'a>(txs: &'a [Transaction], snapshot: &Snapshot) -> Vec<&'a Transaction> {
    let mut matched: Vec<&Transaction> = txs.iter().filter(|tx| matches(tx, snapshot)).collect();
    // Nodes return block order already; the index is authoritative when present
    matched.sort_by_key(|tx| tx.transaction_index.unwrap_or(u64::MAX));
    matched
}
