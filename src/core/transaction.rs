//! Transactions and the observable store that holds them

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Deref;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Transaction {
    pub identifier: String,
    pub units: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl Transaction {
    pub fn new(identifier: &str, units: f64) -> Self {
        Self {
            identifier: identifier.to_string(),
            units,
            price: None,
            date: None,
        }
    }
}

/// A published transaction list. `revision` grows by one with every change,
/// so readers can tell whether they have seen a given mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionList {
    pub revision: u64,
    pub items: Vec<Transaction>,
}

impl Deref for TransactionList {
    type Target = [Transaction];

    fn deref(&self) -> &[Transaction] {
        &self.items
    }
}

/// Holds the current transaction list and publishes every change.
///
/// Subscribers see the current list first, then one update per mutation.
/// Mutations return the revision they produced.
pub struct TransactionStore {
    inner: watch::Sender<TransactionList>,
}

impl TransactionStore {
    pub fn new(initial: Vec<Transaction>) -> Self {
        let (inner, _) = watch::channel(TransactionList {
            revision: 0,
            items: initial,
        });
        Self { inner }
    }

    pub fn subscribe(&self) -> watch::Receiver<TransactionList> {
        self.inner.subscribe()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.borrow().items.clone()
    }

    pub fn identifiers(&self) -> HashSet<String> {
        identifiers_of(&self.inner.borrow())
    }

    pub fn revision(&self) -> u64 {
        self.inner.borrow().revision
    }

    pub fn replace(&self, transactions: Vec<Transaction>) -> u64 {
        debug!(count = transactions.len(), "Replacing transactions");
        let mut revision = 0;
        self.inner.send_modify(|list| {
            list.revision += 1;
            list.items = transactions;
            revision = list.revision;
        });
        revision
    }

    pub fn append(&self, transaction: Transaction) -> u64 {
        debug!(identifier = %transaction.identifier, "Appending transaction");
        let mut revision = 0;
        self.inner.send_modify(|list| {
            list.revision += 1;
            list.items.push(transaction);
            revision = list.revision;
        });
        revision
    }

    /// Removes every transaction for `identifier`. Returns how many were removed.
    pub fn remove(&self, identifier: &str) -> usize {
        let mut removed = 0;
        self.inner.send_if_modified(|list| {
            let before = list.items.len();
            list.items.retain(|t| t.identifier != identifier);
            removed = before - list.items.len();
            if removed > 0 {
                list.revision += 1;
            }
            removed > 0
        });
        debug!(identifier, removed, "Removed transactions");
        removed
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

pub fn identifiers_of(transactions: &[Transaction]) -> HashSet<String> {
    transactions.iter().map(|t| t.identifier.clone()).collect()
}
