//! In-memory peripheral for testing without a radio.
//!
//! [`MockPeripheral`] keeps characteristic values in memory and records every
//! GATT call it receives, so tests can check call order, overlap and cache
//! behaviour. Clones share state: keep one clone to inspect what the code under
//! test did with the other.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::constants::UUID_LISSABON_SERVICE;
use crate::core::bluetooth::peripheral::GattPeripheral;
use crate::core::bluetooth::types::CharacteristicKind;
use crate::core::error::{LissabonError, Result};

/// GATT operations the mock understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GattOp {
    Connect,
    Discover,
    Read,
    Write,
    Disconnect,
}

/// One recorded call. `Start` and `End` bracket each operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    Start(GattOp, Option<Uuid>),
    End(GattOp, Option<Uuid>),
}

#[derive(Default)]
struct MockState {
    characteristics: Vec<Uuid>,
    values: HashMap<Uuid, Vec<u8>>,
    events: Vec<GattEvent>,
    in_flight: usize,
    overlapped: bool,
    connected: bool,
    fail_next: HashSet<GattOp>,
    stall: HashSet<GattOp>,
    delay: Duration,
}

#[derive(Clone)]
pub struct MockPeripheral {
    link_address: String,
    session_id: String,
    state: Arc<Mutex<MockState>>,
}

impl MockPeripheral {
    /// A peripheral exposing the given characteristics, all zeroed.
    pub fn new(link_address: &str, session_id: &str, kinds: &[CharacteristicKind]) -> Self {
        let mut state = MockState::default();
        for kind in kinds {
            state.characteristics.push(kind.uuid());
            state.values.insert(kind.uuid(), vec![0; kind.width()]);
        }
        Self {
            link_address: link_address.to_string(),
            session_id: session_id.to_string(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only happens after a test already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_value(&self, kind: CharacteristicKind, value: Vec<u8>) {
        self.lock().values.insert(kind.uuid(), value);
    }

    pub fn value(&self, kind: CharacteristicKind) -> Option<Vec<u8>> {
        self.lock().values.get(&kind.uuid()).cloned()
    }

    /// Make the next call of `op` fail.
    pub fn fail_next(&self, op: GattOp) {
        self.lock().fail_next.insert(op);
    }

    /// Make every call of `op` hang until cleared.
    pub fn stall(&self, op: GattOp) {
        self.lock().stall.insert(op);
    }

    pub fn clear_stall(&self, op: GattOp) {
        self.lock().stall.remove(&op);
    }

    /// Simulated latency of every operation.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    pub fn events(&self) -> Vec<GattEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Number of completed calls of `op`.
    pub fn count(&self, op: GattOp) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, GattEvent::End(o, _) if *o == op))
            .count()
    }

    /// True if two operations were ever in flight at once.
    pub fn overlapped(&self) -> bool {
        self.lock().overlapped
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn run(&self, op: GattOp, target: Option<Uuid>) -> Result<()> {
        let (delay, stalled) = {
            let mut state = self.lock();
            state.events.push(GattEvent::Start(op, target));
            state.in_flight += 1;
            if state.in_flight > 1 {
                state.overlapped = true;
            }
            (state.delay, state.stall.contains(&op))
        };
        let _in_flight = InFlight(self);

        if stalled {
            std::future::pending::<()>().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.events.push(GattEvent::End(op, target));
        if state.fail_next.remove(&op) {
            return Err(LissabonError::communication(format!("injected {:?} failure", op)));
        }
        match op {
            GattOp::Connect => state.connected = true,
            GattOp::Disconnect => state.connected = false,
            GattOp::Read | GattOp::Write if !state.connected => {
                return Err(LissabonError::communication("peripheral not connected"));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Keeps the in-flight count right when a call is cancelled by a timeout.
struct InFlight<'a>(&'a MockPeripheral);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().in_flight -= 1;
    }
}

#[async_trait]
impl GattPeripheral for MockPeripheral {
    type Handle = Uuid;

    fn link_address(&self) -> String {
        self.link_address.clone()
    }

    fn session_id(&self) -> String {
        self.session_id.clone()
    }

    async fn connect(&self) -> Result<()> {
        self.run(GattOp::Connect, None).await
    }

    async fn discover(&self, service: Uuid, wanted: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>> {
        self.run(GattOp::Discover, None).await?;
        if service != UUID_LISSABON_SERVICE {
            return Ok(Vec::new());
        }
        let state = self.lock();
        Ok(state
            .characteristics
            .iter()
            .filter(|uuid| wanted.contains(uuid))
            .map(|uuid| (*uuid, *uuid))
            .collect())
    }

    async fn read(&self, handle: &Uuid) -> Result<Vec<u8>> {
        self.run(GattOp::Read, Some(*handle)).await?;
        Ok(self.lock().values.get(handle).cloned().unwrap_or_default())
    }

    async fn write(&self, handle: &Uuid, data: &[u8]) -> Result<()> {
        self.run(GattOp::Write, Some(*handle)).await?;
        self.lock().values.insert(*handle, data.to_vec());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.run(GattOp::Disconnect, None).await
    }
}
