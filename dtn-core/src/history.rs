//! Exchange history: every dispatch sent, received or being composed, in order.

use serde::{Deserialize, Serialize};

use crate::dispatch::Dispatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

/// The persisted unit: a dispatch and which way it travelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub dispatch: Dispatch,
    pub direction: Direction,
}

impl ExchangeRecord {
    pub fn sent(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            direction: Direction::Sent,
        }
    }

    pub fn received(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            direction: Direction::Received,
        }
    }
}

/// Ordered records. The last one is always the outbound dispatch being composed.
#[derive(Debug, Clone)]
pub struct ExchangeHistory {
    records: Vec<ExchangeRecord>,
}

impl ExchangeHistory {
    /// Start from `past` (empty dispatches dropped) and open a fresh outbound dispatch.
    pub fn resume(past: Vec<ExchangeRecord>, capacity: usize) -> Self {
        let mut records: Vec<ExchangeRecord> = past
            .into_iter()
            .filter(|r| !r.dispatch.is_empty())
            .collect();
        records.push(ExchangeRecord::sent(Dispatch::new(capacity)));
        Self { records }
    }

    pub fn records(&self) -> &[ExchangeRecord] {
        &self.records
    }

    /// Records worth persisting.
    pub fn non_empty(&self) -> impl Iterator<Item = &ExchangeRecord> {
        self.records.iter().filter(|r| !r.dispatch.is_empty())
    }

    pub fn outbound(&self) -> &Dispatch {
        &self.last().dispatch
    }

    pub fn outbound_mut(&mut self) -> &mut Dispatch {
        let idx = self.records.len() - 1;
        &mut self.records[idx].dispatch
    }

    pub fn dispatches_mut(&mut self) -> impl Iterator<Item = &mut Dispatch> {
        self.records.iter_mut().map(|r| &mut r.dispatch)
    }

    /// Append the dispatches just received, in arrival order, then a new
    /// empty outbound one.
    pub(crate) fn record_exchange(&mut self, received: impl IntoIterator<Item = Dispatch>, capacity: usize) {
        self.records
            .extend(received.into_iter().map(ExchangeRecord::received));
        self.records.push(ExchangeRecord::sent(Dispatch::new(capacity)));
    }

    fn last(&self) -> &ExchangeRecord {
        // `resume` and `record_exchange` always leave an outbound record.
        &self.records[self.records.len() - 1]
    }
}
