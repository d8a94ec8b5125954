use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dispatch_common::{DispatchError, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Default)]
struct Occupancy {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Admission control: at most `limit` permits outstanding. Waiters are
/// admitted in FIFO order, one per released permit.
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    occupancy: Arc<Occupancy>,
    limit: usize,
}

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Result<Self> {
        if limit == 0 || limit > Semaphore::MAX_PERMITS {
            return Err(DispatchError::Config(format!("concurrency limit {limit} out of range")));
        }
        Ok(Self { semaphore: Arc::new(Semaphore::new(limit)), occupancy: Arc::default(), limit })
    }

    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = self.semaphore.clone().acquire_owned().await.map_err(|_| DispatchError::GateClosed)?;
        Ok(self.admit(permit))
    }

    pub fn try_acquire(&self) -> Option<GatePermit> {
        self.semaphore.clone().try_acquire_owned().ok().map(|p| self.admit(p))
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> GatePermit {
        let now = self.occupancy.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.occupancy.peak.fetch_max(now, Ordering::SeqCst);
        GatePermit { _permit: permit, occupancy: self.occupancy.clone() }
    }

    pub fn limit(&self) -> usize { self.limit }
    pub fn in_flight(&self) -> usize { self.occupancy.in_flight.load(Ordering::SeqCst) }
    pub fn peak(&self) -> usize { self.occupancy.peak.load(Ordering::SeqCst) }
    pub fn available(&self) -> usize { self.semaphore.available_permits() }
}

/// One admitted slot. Dropping it frees the slot.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    occupancy: Arc<Occupancy>,
}

// The count drops before the semaphore permit (a field) is returned, so
// `in_flight` never reads above the limit.
impl Drop for GatePermit {
    fn drop(&mut self) {
        self.occupancy.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
