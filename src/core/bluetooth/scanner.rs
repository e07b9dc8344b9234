use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bluest::{Adapter, AdvertisingDevice};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::constants::{SCAN_CHANNEL_CAPACITY, UUID_LISSABON_SERVICE};
use crate::core::bluetooth::peripheral::{BluestPeripheral, GattPeripheral};
use crate::core::bluetooth::radio::RadioCoordinator;
use crate::core::bluetooth::session::with_timeout;
use crate::core::bluetooth::types::{CharacteristicKind, CharacteristicSet, DeviceDescriptor};

/// A probed Lissabon device together with the peripheral it was found on
pub struct Discovery<P> {
    pub descriptor: DeviceDescriptor,
    pub peripheral: P,
}

/// An advertisement is accepted only if it lists the Lissabon service.
pub fn accepts_advertisement(service_uuids: &[Uuid]) -> bool {
    !service_uuids.is_empty() && service_uuids.contains(&UUID_LISSABON_SERVICE)
}

/// Resolves the identity of a peripheral.
///
/// The link address is empty on platforms that hide hardware addresses; the
/// stack-assigned session id stands in for it. An empty name becomes the address.
pub fn resolve_identity(link_address: &str, session_id: &str, local_name: &str) -> (String, String) {
    let address = if link_address.is_empty() {
        session_id.to_string()
    } else {
        link_address.to_string()
    };
    let name = if local_name.is_empty() {
        address.clone()
    } else {
        local_name.to_string()
    };
    (address, name)
}

/// Builds the descriptor for a probed peripheral. Devices without `isOn` are ignored.
pub fn build_descriptor<H>(
    link_address: &str,
    session_id: &str,
    local_name: &str,
    found: &CharacteristicSet<H>,
) -> Option<DeviceDescriptor> {
    let Some(device_type) = found.device_type() else {
        warn!("lissabon BLE device without isOn characteristic ignored");
        return None;
    };
    let (address, name) = resolve_identity(link_address, session_id, local_name);
    Some(DeviceDescriptor {
        address,
        name,
        device_type,
        has_brightness: found.has(CharacteristicKind::Brightness),
        has_temperature: found.has(CharacteristicKind::Temperature),
        is_bluetooth: true,
    })
}

/// Connects to `peripheral`, records which Lissabon characteristics it has, and disconnects.
pub async fn probe<P: GattPeripheral>(
    peripheral: &P,
    local_name: &str,
    radio: &RadioCoordinator,
    timeout: Duration,
) -> crate::core::error::Result<Option<DeviceDescriptor>> {
    let _permit = radio.acquire().await?;
    let result = probe_connected(peripheral, local_name, timeout).await;
    if result.is_err() {
        if let Err(e) = with_timeout(timeout, "disconnect", peripheral.disconnect()).await {
            warn!("Probe disconnect failed: {}", e);
        }
    }
    result
}

async fn probe_connected<P: GattPeripheral>(
    peripheral: &P,
    local_name: &str,
    timeout: Duration,
) -> crate::core::error::Result<Option<DeviceDescriptor>> {
    with_timeout(timeout, "connect", peripheral.connect()).await?;
    debug!("Probe connected to {}", peripheral.session_id());

    let wanted = CharacteristicKind::wanted_uuids();
    let found = with_timeout(
        timeout,
        "discover",
        peripheral.discover(UUID_LISSABON_SERVICE, &wanted),
    )
    .await?;
    for (uuid, _) in &found {
        debug!("characteristic: {}", uuid);
    }
    let found = CharacteristicSet::from_discovered(found);

    let descriptor = build_descriptor(
        &peripheral.link_address(),
        &peripheral.session_id(),
        local_name,
        &found,
    );
    with_timeout(timeout, "disconnect", peripheral.disconnect()).await?;
    Ok(descriptor)
}

/// Probed results by session id. `None` marks a rejected device.
type ProbeMemo = HashMap<String, Option<DeviceDescriptor>>;

/// Scans for Lissabon lights and probes their capabilities.
pub struct BluetoothScanner {
    adapter: Adapter,
    radio: RadioCoordinator,
    timeout: Duration,
    cancel_token: Arc<CancellationToken>,
    scan_task_handle: Option<JoinHandle<()>>,
    probe_task_handle: Option<JoinHandle<()>>,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, radio: RadioCoordinator, timeout: Duration) -> Self {
        Self {
            adapter,
            radio,
            timeout,
            cancel_token: Arc::new(CancellationToken::new()),
            scan_task_handle: None,
            probe_task_handle: None,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_task_handle.is_some()
    }

    /// Starts scanning once the adapter is powered on.
    /// Emits one [`Discovery`] per accepted advertisement.
    pub async fn start_scan(&mut self) -> Result<mpsc::Receiver<Discovery<BluestPeripheral>>> {
        if self.scan_task_handle.is_some() {
            self.stop_scan().await?;
        }
        self.cancel_token = Arc::new(CancellationToken::new());

        let (candidate_tx, candidate_rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let (discovery_tx, discovery_rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);

        let adapter = self.adapter.clone();
        let radio = self.radio.clone();
        let cancel_token = self.cancel_token.clone();
        self.scan_task_handle = Some(tokio::spawn(async move {
            if let Err(e) = Self::internal_scan_task(adapter, radio, candidate_tx, cancel_token).await {
                error!("Scan task finished with an error: {:?}", e);
            }
        }));

        let radio = self.radio.clone();
        let timeout = self.timeout;
        let cancel_token = self.cancel_token.clone();
        self.probe_task_handle = Some(tokio::spawn(async move {
            Self::internal_probe_task(candidate_rx, discovery_tx, radio, timeout, cancel_token).await;
        }));

        info!("Device scan task started.");
        Ok(discovery_rx)
    }

    async fn internal_scan_task(
        adapter: Adapter,
        radio: RadioCoordinator,
        candidates: mpsc::Sender<(BluestPeripheral, String)>,
        cancel_token: Arc<CancellationToken>,
    ) -> Result<()> {
        adapter.wait_available().await?;
        info!("Bluetooth adapter is powered on.");

        let mut gate = radio.subscribe();
        let services = [UUID_LISSABON_SERVICE];
        loop {
            // Wait until no connect holds the radio. Connects wait for `_scanning` to drop,
            // which happens after `scan_stream` below.
            let _scanning = loop {
                drop(gate.borrow_and_update());
                if let Some(scanning) = radio.try_begin_scan() {
                    break scanning;
                }
                tokio::select! {
                    _ = cancel_token.cancelled() => return Ok(()),
                    changed = gate.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                    }
                }
            };

            info!("Starting bluetooth scan");
            let mut scan_stream = adapter.scan(&services).await?;
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => return Ok(()),
                    changed = gate.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                        let allowed = gate.borrow().scanning_allowed();
                        if !allowed {
                            info!("Pausing scan while the radio is busy");
                            break;
                        }
                    }
                    result = scan_stream.next() => match result {
                        Some(discovered) => Self::handle_advertisement(&adapter, discovered, &candidates),
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn handle_advertisement(
        adapter: &Adapter,
        discovered: AdvertisingDevice,
        candidates: &mpsc::Sender<(BluestPeripheral, String)>,
    ) {
        if !accepts_advertisement(&discovered.adv_data.services) {
            return;
        }
        let local_name = discovered.adv_data.local_name.unwrap_or_default();
        info!(
            "Lissabon peripheral discovered: {} name {:?} rssi {:?}",
            discovered.device.id(),
            local_name,
            discovered.rssi
        );
        let peripheral = BluestPeripheral::new(adapter.clone(), discovered.device);
        Self::enqueue_candidate(candidates, peripheral, local_name);
    }

    /// Hands a candidate to the probe task without waiting.
    ///
    /// Never blocks: a full queue can mean the probe task is waiting for the
    /// scan task to stop scanning.
    fn enqueue_candidate<P: GattPeripheral>(
        candidates: &mpsc::Sender<(P, String)>,
        peripheral: P,
        local_name: String,
    ) -> bool {
        match candidates.try_send((peripheral, local_name)) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Probe queue full, advertisement of {} dropped",
                    e.into_inner().0.session_id()
                );
                false
            }
        }
    }

    async fn internal_probe_task<P: GattPeripheral>(
        mut candidates: mpsc::Receiver<(P, String)>,
        discoveries: mpsc::Sender<Discovery<P>>,
        radio: RadioCoordinator,
        timeout: Duration,
        cancel_token: Arc<CancellationToken>,
    ) {
        let mut memo = ProbeMemo::new();
        loop {
            let (peripheral, local_name) = tokio::select! {
                _ = cancel_token.cancelled() => break,
                candidate = candidates.recv() => match candidate {
                    Some(candidate) => candidate,
                    None => break,
                }
            };
            let Some(descriptor) =
                Self::probe_once(&mut memo, &peripheral, &local_name, &radio, timeout).await
            else {
                continue;
            };
            if discoveries.send(Discovery { descriptor, peripheral }).await.is_err() {
                info!("Discovery receiver dropped, probe task ending");
                break;
            }
        }
    }

    /// Probes a peripheral the first time it is seen; later advertisements reuse the result.
    async fn probe_once<P: GattPeripheral>(
        memo: &mut ProbeMemo,
        peripheral: &P,
        local_name: &str,
        radio: &RadioCoordinator,
        timeout: Duration,
    ) -> Option<DeviceDescriptor> {
        let key = peripheral.session_id();
        if let Some(known) = memo.get(&key) {
            return known.clone();
        }
        match probe(peripheral, local_name, radio, timeout).await {
            Ok(descriptor) => {
                memo.insert(key, descriptor.clone());
                descriptor
            }
            Err(e) => {
                error!("discoverServices error: {}", e);
                None
            }
        }
    }

    pub async fn stop_scan(&mut self) -> Result<()> {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();

        for handle in [self.scan_task_handle.take(), self.probe_task_handle.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = handle.await {
                if e.is_cancelled() {
                    info!("Scan task was cancelled successfully.");
                } else {
                    error!("Scan task finished with an unexpected join error: {:?}", e);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::mock::{GattOp, MockPeripheral};
    use crate::core::bluetooth::types::CharacteristicKind::{Brightness, IsOn, Temperature};
    use crate::core::bluetooth::types::DeviceType;

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn advertisements_need_the_lissabon_service() {
        assert!(accepts_advertisement(&[UUID_LISSABON_SERVICE]));
        assert!(accepts_advertisement(&[
            Uuid::from_u128(0x180f),
            UUID_LISSABON_SERVICE
        ]));
        assert!(!accepts_advertisement(&[]));
        assert!(!accepts_advertisement(&[Uuid::from_u128(0x180f)]));
    }

    #[test]
    fn empty_address_and_name_fall_back() {
        let (address, name) = resolve_identity("", "ABCD-1234", "");
        assert_eq!(address, "ABCD-1234");
        assert_eq!(name, "ABCD-1234");

        let (address, name) = resolve_identity("AA:BB:CC:DD:EE:FF", "ABCD-1234", "Lamp1");
        assert_eq!(address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(name, "Lamp1");
    }

    #[tokio::test]
    async fn dimmer_probe_yields_descriptor() {
        let mock = MockPeripheral::new("AA:BB:CC:DD:EE:FF", "id-1", &[IsOn, Brightness]);
        let radio = RadioCoordinator::default();

        let descriptor = probe(&mock, "Lamp1", &radio, TIMEOUT).await.unwrap().unwrap();

        assert_eq!(
            descriptor,
            DeviceDescriptor {
                address: "AA:BB:CC:DD:EE:FF".to_string(),
                name: "Lamp1".to_string(),
                device_type: DeviceType::Dimmer,
                has_brightness: true,
                has_temperature: false,
                is_bluetooth: true,
            }
        );
        assert!(!mock.is_connected());
        assert!(radio.gate().scanning_allowed());
    }

    #[tokio::test]
    async fn temperature_makes_a_ledstrip() {
        let mock = MockPeripheral::new("", "ABCD-1234", &[IsOn, Temperature]);
        let radio = RadioCoordinator::default();

        let descriptor = probe(&mock, "", &radio, TIMEOUT).await.unwrap().unwrap();
        assert_eq!(descriptor.device_type, DeviceType::Ledstrip);
        assert!(!descriptor.has_brightness);
        assert!(descriptor.has_temperature);
        assert_eq!(descriptor.address, "ABCD-1234");
        assert_eq!(descriptor.name, "ABCD-1234");
    }

    #[tokio::test]
    async fn device_without_is_on_is_never_emitted() {
        let mock = MockPeripheral::new("AA", "id-1", &[Brightness, Temperature]);
        let radio = RadioCoordinator::default();

        assert_eq!(probe(&mock, "Lamp1", &radio, TIMEOUT).await.unwrap(), None);
        assert_eq!(mock.count(GattOp::Disconnect), 1);
    }

    #[tokio::test]
    async fn probe_task_reuses_results_and_skips_rejects() {
        let good = MockPeripheral::new("AA", "id-good", &[IsOn]);
        let bad = MockPeripheral::new("BB", "id-bad", &[Brightness]);
        let (candidate_tx, candidate_rx) = mpsc::channel(8);
        let (discovery_tx, mut discovery_rx) = mpsc::channel(8);

        let task = tokio::spawn(BluetoothScanner::internal_probe_task(
            candidate_rx,
            discovery_tx,
            RadioCoordinator::default(),
            TIMEOUT,
            Arc::new(CancellationToken::new()),
        ));

        for peripheral in [good.clone(), bad.clone(), good.clone(), bad.clone()] {
            candidate_tx.send((peripheral, String::new())).await.unwrap();
        }
        drop(candidate_tx);

        let first = discovery_rx.recv().await.unwrap();
        let second = discovery_rx.recv().await.unwrap();
        assert!(discovery_rx.recv().await.is_none());
        task.await.unwrap();

        assert_eq!(first.descriptor, second.descriptor);
        assert_eq!(first.descriptor.address, "AA");
        assert_eq!(good.count(GattOp::Connect), 1);
        assert_eq!(bad.count(GattOp::Connect), 1);
    }

    #[tokio::test]
    async fn failed_probe_is_retried_on_next_advertisement() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn]);
        let radio = RadioCoordinator::default();
        let mut memo = ProbeMemo::new();

        mock.fail_next(GattOp::Discover);
        assert!(
            BluetoothScanner::probe_once(&mut memo, &mock, "", &radio, TIMEOUT)
                .await
                .is_none()
        );
        assert!(!mock.is_connected());
        assert!(
            BluetoothScanner::probe_once(&mut memo, &mock, "", &radio, TIMEOUT)
                .await
                .is_some()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_probe_queue_drops_without_blocking() {
        let (candidate_tx, mut candidate_rx) = mpsc::channel(1);
        let first = MockPeripheral::new("AA", "id-1", &[IsOn]);
        let second = MockPeripheral::new("BB", "id-2", &[IsOn]);

        assert!(BluetoothScanner::enqueue_candidate(&candidate_tx, first, "Lamp1".to_string()));
        assert!(!BluetoothScanner::enqueue_candidate(&candidate_tx, second, "Lamp2".to_string()));

        let (queued, name) = candidate_rx.recv().await.unwrap();
        assert_eq!(queued.session_id(), "id-1");
        assert_eq!(name, "Lamp1");
        assert!(candidate_rx.try_recv().is_err());
    }
}
