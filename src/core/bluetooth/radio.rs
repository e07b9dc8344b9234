//! Shared radio coordination
//! Scanning and connecting contend for the same adapter. Every connect goes
//! through [`RadioCoordinator::acquire`], which bounds the number of connects in
//! flight and pauses the scanner until the returned permit is dropped. A permit
//! is handed out only once the scanner has stopped its scan.

use std::sync::Arc;

use log::debug;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};

use crate::core::bluetooth::constants::DEFAULT_MAX_CONCURRENT_CONNECTS;
use crate::core::error::{LissabonError, Result};

/// Scan gate shared with the scanner task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanGate {
    /// Number of live permits pausing the scan
    pub paused: usize,
    /// Set once a connect finished while `resume_scan` is off
    pub stopped: bool,
    /// A scan stream is open
    pub scanning: bool,
}

impl ScanGate {
    pub fn scanning_allowed(&self) -> bool {
        self.paused == 0 && !self.stopped
    }
}

#[derive(Clone)]
pub struct RadioCoordinator {
    connects: Arc<Semaphore>,
    gate: Arc<watch::Sender<ScanGate>>,
    resume_scan: bool,
}

impl Default for RadioCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_CONNECTS, true)
    }
}

impl RadioCoordinator {
    pub fn new(max_concurrent_connects: usize, resume_scan: bool) -> Self {
        let (gate, _) = watch::channel(ScanGate::default());
        Self {
            connects: Arc::new(Semaphore::new(max_concurrent_connects.max(1))),
            gate: Arc::new(gate),
            resume_scan,
        }
    }

    /// Waits for a connect slot, pauses scanning, and returns once no scan is running.
    pub async fn acquire(&self) -> Result<RadioPermit> {
        let permit = self
            .connects
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LissabonError::communication("radio coordinator closed"))?;
        self.gate.send_modify(|gate| gate.paused += 1);
        let permit = RadioPermit {
            _permit: permit,
            gate: self.gate.clone(),
            resume_scan: self.resume_scan,
        };

        let mut gate = self.gate.subscribe();
        gate.wait_for(|gate| !gate.scanning)
            .await
            .map_err(|_| LissabonError::communication("radio coordinator closed"))?;
        debug!("Radio permit acquired, scan paused");
        Ok(permit)
    }

    /// Marks a scan as running if scanning is allowed right now.
    ///
    /// Check and mark happen under the gate's lock, so no permit can be handed
    /// out in between. The scan counts as running until the guard is dropped.
    pub fn try_begin_scan(&self) -> Option<ScanActivity> {
        let began = self.gate.send_if_modified(|gate| {
            if gate.scanning_allowed() && !gate.scanning {
                gate.scanning = true;
                true
            } else {
                false
            }
        });
        began.then(|| ScanActivity {
            gate: self.gate.clone(),
        })
    }

    /// Receiver the scanner watches to know when it may scan.
    pub fn subscribe(&self) -> watch::Receiver<ScanGate> {
        self.gate.subscribe()
    }

    pub fn gate(&self) -> ScanGate {
        *self.gate.borrow()
    }

    pub fn available_connects(&self) -> usize {
        self.connects.available_permits()
    }
}

/// Exclusive use of one connect slot. Scanning resumes when the last permit drops.
pub struct RadioPermit {
    _permit: OwnedSemaphorePermit,
    gate: Arc<watch::Sender<ScanGate>>,
    resume_scan: bool,
}

impl Drop for RadioPermit {
    fn drop(&mut self) {
        let resume_scan = self.resume_scan;
        self.gate.send_modify(|gate| {
            gate.paused = gate.paused.saturating_sub(1);
            if !resume_scan {
                gate.stopped = true;
            }
        });
        debug!("Radio permit released");
    }
}

/// A running scan. Drop it after the scan stream is closed.
pub struct ScanActivity {
    gate: Arc<watch::Sender<ScanGate>>,
}

impl Drop for ScanActivity {
    fn drop(&mut self) {
        self.gate.send_modify(|gate| gate.scanning = false);
        debug!("Scan stopped");
    }
}
