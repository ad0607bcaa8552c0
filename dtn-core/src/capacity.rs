//! Capacity policy: gates applied before a composed message enters the outbound dispatch.

use crate::dispatch::Dispatch;
use crate::party::Party;

/// Check the per-sender quota, then the dispatch capacity.
///
/// The unauthenticated party has quota 0 and is always rejected here.
pub fn check(dispatch: &Dispatch, sender: &Party) -> Result<(), CapacityError> {
    // A restored dispatch may already hold more than a since-lowered quota.
    if dispatch.count_by_sender(sender) >= sender.message_quota() {
        return Err(CapacityError::QuotaExceeded {
            quota: sender.message_quota(),
        });
    }
    if dispatch.is_full() {
        return Err(CapacityError::DispatchFull {
            capacity: dispatch.capacity(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("message limit reached: at most {quota} messages per dispatch, wait for the next dispatch")]
    QuotaExceeded { quota: usize },
    #[error("the dispatch is full ({capacity} messages), wait for the next dispatch")]
    DispatchFull { capacity: usize },
}
