//! Per-device connection handling
//! A [`DeviceSession`] owns one peripheral's connection and its cached
//! characteristic handles. All methods take `&mut self`; the command executor
//! wraps the session in a mutex so at most one GATT transaction is in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::core::bluetooth::constants::UUID_LISSABON_SERVICE;
use crate::core::bluetooth::peripheral::GattPeripheral;
use crate::core::bluetooth::radio::{RadioCoordinator, RadioPermit};
use crate::core::bluetooth::types::{CharacteristicKind, CharacteristicSet, ConnectionState};
use crate::core::error::{LissabonError, Result};

/// Runs one radio step under `timeout`. Timing out counts as a communication failure.
pub async fn with_timeout<T>(
    timeout: Duration,
    step: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|e| match e {
            LissabonError::CommunicationFailure { .. } => e,
            other => LissabonError::communication(format!("{} failed: {}", step, other)),
        }),
        Err(_) => Err(LissabonError::communication(format!(
            "{} timed out after {} ms",
            step,
            timeout.as_millis()
        ))),
    }
}

pub struct DeviceSession<P: GattPeripheral> {
    name: String,
    address: String,
    peripheral: Option<Arc<P>>,
    state: ConnectionState,
    characteristics: Option<CharacteristicSet<P::Handle>>,
    radio: RadioCoordinator,
    permit: Option<RadioPermit>,
    timeout: Duration,
}

impl<P: GattPeripheral> DeviceSession<P> {
    /// Creates a session; `peripheral` is `None` for configured devices not yet seen by the scanner.
    pub fn new(
        name: &str,
        address: &str,
        peripheral: Option<P>,
        radio: RadioCoordinator,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            peripheral: peripheral.map(Arc::new),
            state: ConnectionState::Disconnected,
            characteristics: None,
            radio,
            permit: None,
            timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn has_peripheral(&self) -> bool {
        self.peripheral.is_some()
    }

    /// True while discovered handles are cached.
    pub fn has_cached_characteristics(&self) -> bool {
        self.characteristics.is_some()
    }

    /// Associates a live peripheral with a session that has none.
    /// Returns false, leaving the session untouched, if one is already attached.
    pub fn attach(&mut self, peripheral: P) -> bool {
        if self.peripheral.is_some() {
            return false;
        }
        info!("[{}] BLE peripheral {} attached", self.name, self.address);
        self.peripheral = Some(Arc::new(peripheral));
        self.characteristics = None;
        self.state = ConnectionState::Disconnected;
        true
    }

    fn peripheral(&self) -> Result<Arc<P>> {
        match &self.peripheral {
            Some(peripheral) => Ok(peripheral.clone()),
            None => {
                error!(
                    "[{}] BLE peripheral {} not BLE-discovered yet",
                    self.name, self.address
                );
                Err(LissabonError::not_discovered(&self.address))
            }
        }
    }

    /// Makes the session `Ready`.
    ///
    /// Returns `true` if the connection already existed; the caller must then
    /// leave it open. Returns `false` if this call opened it; the caller owns
    /// the connection and must disconnect when done.
    pub async fn ensure_ready(&mut self) -> Result<bool> {
        if self.state == ConnectionState::Ready {
            if self.characteristics.is_none() {
                let peripheral = self.peripheral()?;
                self.discover(&peripheral).await?;
                self.state = ConnectionState::Ready;
            }
            return Ok(true);
        }
        if self.state != ConnectionState::Disconnected {
            self.recover().await;
        }
        let peripheral = self.peripheral()?;
        let permit = self.radio.acquire().await?;

        self.state = ConnectionState::Connecting;
        debug!("[{}] Connecting to {}", self.name, self.address);
        if let Err(e) = with_timeout(self.timeout, "connect", peripheral.connect()).await {
            return Err(self.fail(&peripheral, e).await);
        }

        if self.characteristics.is_none() {
            self.discover(&peripheral).await?;
        }

        self.state = ConnectionState::Ready;
        self.permit = Some(permit);
        Ok(false)
    }

    async fn discover(&mut self, peripheral: &Arc<P>) -> Result<()> {
        self.state = ConnectionState::DiscoveringCharacteristics;
        debug!("[{}] Discovering characteristics", self.name);
        let wanted = CharacteristicKind::wanted_uuids();
        match with_timeout(
            self.timeout,
            "discover",
            peripheral.discover(UUID_LISSABON_SERVICE, &wanted),
        )
        .await
        {
            Ok(found) => {
                self.characteristics = Some(CharacteristicSet::from_discovered(found));
                Ok(())
            }
            Err(e) => Err(self.fail(peripheral, e).await),
        }
    }

    /// Cleans up after a transaction whose caller went away mid-step: the
    /// connection is in an unknown state and may still hold a radio permit.
    async fn recover(&mut self) {
        warn!(
            "[{}] Previous request was interrupted in state {}, resetting",
            self.name, self.state
        );
        self.characteristics = None;
        if let Some(peripheral) = self.peripheral.clone() {
            if let Err(e) = with_timeout(self.timeout, "disconnect", peripheral.disconnect()).await {
                warn!("[{}] Disconnect after interruption failed: {}", self.name, e);
            }
        }
        self.state = ConnectionState::Disconnected;
        self.permit = None;
    }

    /// Reads the raw value of `kind`.
    pub async fn read(&mut self, kind: CharacteristicKind) -> Result<Vec<u8>> {
        let already_connected = self.ensure_ready().await?;
        let (peripheral, handle) = self.resolve(kind, already_connected).await?;

        self.state = ConnectionState::Busy;
        match with_timeout(self.timeout, "read", peripheral.read(&handle)).await {
            Ok(buf) => {
                self.finish(&peripheral, already_connected).await?;
                Ok(buf)
            }
            Err(e) => Err(self.fail(&peripheral, e).await),
        }
    }

    /// Writes `data` to `kind`.
    pub async fn write(&mut self, kind: CharacteristicKind, data: &[u8]) -> Result<()> {
        let already_connected = self.ensure_ready().await?;
        let (peripheral, handle) = self.resolve(kind, already_connected).await?;

        self.state = ConnectionState::Busy;
        match with_timeout(self.timeout, "write", peripheral.write(&handle, data)).await {
            Ok(()) => self.finish(&peripheral, already_connected).await,
            Err(e) => Err(self.fail(&peripheral, e).await),
        }
    }

    /// Opens a connection that outlives individual reads and writes, until [`Self::close`].
    pub async fn open(&mut self) -> Result<()> {
        self.ensure_ready().await?;
        self.permit = None;
        Ok(())
    }

    /// Closes a connection opened with [`Self::open`]. Cached handles survive.
    pub async fn close(&mut self) -> Result<()> {
        if self.state != ConnectionState::Ready {
            return Ok(());
        }
        let peripheral = self.peripheral()?;
        self.finish(&peripheral, false).await
    }

    /// Looks up the cached handle for `kind`. A missing handle invalidates the cache;
    /// an open connection rediscovers on its next request.
    async fn resolve(
        &mut self,
        kind: CharacteristicKind,
        already_connected: bool,
    ) -> Result<(Arc<P>, P::Handle)> {
        let peripheral = self.peripheral()?;
        let handle = self
            .characteristics
            .as_ref()
            .and_then(|set| set.get(kind))
            .cloned();
        match handle {
            Some(handle) => Ok((peripheral, handle)),
            None => {
                error!(
                    "[{}] BLE characteristic {} not found for peripheral {}",
                    self.name, kind, self.address
                );
                self.characteristics = None;
                if already_connected {
                    self.state = ConnectionState::Ready;
                } else {
                    self.release(&peripheral).await;
                }
                Err(LissabonError::characteristic_not_found(kind))
            }
        }
    }

    /// Ends a successful transaction. Disconnects only if this transaction opened the connection.
    async fn finish(&mut self, peripheral: &Arc<P>, already_connected: bool) -> Result<()> {
        if already_connected {
            self.state = ConnectionState::Ready;
            return Ok(());
        }
        debug!("[{}] Disconnecting...", self.name);
        match with_timeout(self.timeout, "disconnect", peripheral.disconnect()).await {
            Ok(()) => {
                self.state = ConnectionState::Disconnected;
                self.permit = None;
                debug!("[{}] Disconnected.", self.name);
                Ok(())
            }
            Err(e) => Err(self.fail(peripheral, e).await),
        }
    }

    /// Best-effort disconnect without touching the cache.
    async fn release(&mut self, peripheral: &Arc<P>) {
        if let Err(e) = with_timeout(self.timeout, "disconnect", peripheral.disconnect()).await {
            warn!("[{}] Disconnect failed: {}", self.name, e);
        }
        self.state = ConnectionState::Disconnected;
        self.permit = None;
    }

    /// Classifies a failed step: Error, cache invalidated, forced disconnect, Disconnected.
    async fn fail(&mut self, peripheral: &Arc<P>, cause: LissabonError) -> LissabonError {
        error!(
            "[{}] BLE error: {} state={} address={}",
            self.name, cause, self.state, self.address
        );
        self.state = ConnectionState::Error;
        self.characteristics = None;
        if let Err(e) = with_timeout(self.timeout, "disconnect", peripheral.disconnect()).await {
            warn!("[{}] Disconnect after error failed: {}", self.name, e);
        }
        self.state = ConnectionState::Disconnected;
        self.permit = None;
        match cause {
            LissabonError::CommunicationFailure { .. } => cause,
            other => LissabonError::communication(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::mock::{GattEvent, GattOp, MockPeripheral};
    use crate::core::bluetooth::types::CharacteristicKind::{Brightness, IsOn, Temperature};

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn session(mock: &MockPeripheral) -> DeviceSession<MockPeripheral> {
        DeviceSession::new(
            "Lamp1",
            "AA:BB:CC:DD:EE:FF",
            Some(mock.clone()),
            RadioCoordinator::default(),
            TIMEOUT,
        )
    }

    #[tokio::test]
    async fn write_connects_discovers_and_disconnects() {
        let mock = MockPeripheral::new("AA:BB:CC:DD:EE:FF", "id-1", &[IsOn, Brightness]);
        let mut session = session(&mock);

        session.write(IsOn, &[1]).await.unwrap();

        assert_eq!(mock.value(IsOn), Some(vec![1]));
        assert_eq!(mock.count(GattOp::Connect), 1);
        assert_eq!(mock.count(GattOp::Discover), 1);
        assert_eq!(mock.count(GattOp::Disconnect), 1);
        assert!(!mock.is_connected());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.has_cached_characteristics());
    }

    #[tokio::test]
    async fn cache_survives_clean_disconnect() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn, Brightness]);
        mock.set_value(Brightness, vec![0x10, 0x27]);
        let mut session = session(&mock);

        session.write(IsOn, &[1]).await.unwrap();
        let buf = session.read(Brightness).await.unwrap();

        assert_eq!(buf, vec![0x10, 0x27]);
        assert_eq!(mock.count(GattOp::Connect), 2);
        assert_eq!(mock.count(GattOp::Discover), 1);
    }

    #[tokio::test]
    async fn failed_read_invalidates_cache_and_disconnects() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn]);
        let mut session = session(&mock);
        session.read(IsOn).await.unwrap();

        mock.fail_next(GattOp::Read);
        let err = session.read(IsOn).await.unwrap_err();
        assert!(matches!(err, LissabonError::CommunicationFailure { .. }));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.has_cached_characteristics());
        assert!(!mock.is_connected());

        session.read(IsOn).await.unwrap();
        assert_eq!(mock.count(GattOp::Discover), 2);
    }

    #[tokio::test]
    async fn connect_failure_is_communication_failure() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn]);
        let mut session = session(&mock);
        mock.fail_next(GattOp::Connect);

        let err = session.write(IsOn, &[0]).await.unwrap_err();
        assert!(matches!(err, LissabonError::CommunicationFailure { .. }));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(mock.count(GattOp::Discover), 0);
        assert_eq!(mock.count(GattOp::Write), 0);
    }

    #[tokio::test]
    async fn discover_failure_leaves_cache_empty() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn]);
        let mut session = session(&mock);
        mock.fail_next(GattOp::Discover);

        assert!(session.read(IsOn).await.is_err());
        assert!(!session.has_cached_characteristics());
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn missing_characteristic_is_reported() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn]);
        let mut session = session(&mock);

        let err = session.read(Temperature).await.unwrap_err();
        assert!(matches!(
            err,
            LissabonError::CharacteristicNotFound { kind: Temperature }
        ));
        assert_eq!(mock.count(GattOp::Read), 0);
        assert!(!mock.is_connected());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.has_cached_characteristics());
    }

    #[tokio::test]
    async fn unattached_session_is_not_discovered() {
        let mut session: DeviceSession<MockPeripheral> = DeviceSession::new(
            "Lamp1",
            "AA",
            None,
            RadioCoordinator::default(),
            TIMEOUT,
        );
        let err = session.read(IsOn).await.unwrap_err();
        assert!(matches!(err, LissabonError::NotDiscovered { .. }));

        let mock = MockPeripheral::new("AA", "id-1", &[IsOn]);
        assert!(session.attach(mock.clone()));
        assert!(!session.attach(mock.clone()));
        session.read(IsOn).await.unwrap();
    }

    #[tokio::test]
    async fn open_connection_is_left_open() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn]);
        let mut session = session(&mock);

        session.open().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Ready);
        assert!(session.ensure_ready().await.unwrap());

        session.write(IsOn, &[1]).await.unwrap();
        session.read(IsOn).await.unwrap();
        assert_eq!(mock.count(GattOp::Connect), 1);
        assert_eq!(mock.count(GattOp::Disconnect), 0);
        assert!(mock.is_connected());

        session.close().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!mock.is_connected());
        assert!(session.has_cached_characteristics());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn]);
        let mut session = session(&mock);
        mock.stall(GattOp::Write);

        let err = session.write(IsOn, &[1]).await.unwrap_err();
        assert!(err.to_string().contains("write timed out"));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.has_cached_characteristics());
        assert_eq!(
            mock.events().last(),
            Some(&GattEvent::End(GattOp::Disconnect, None))
        );
    }

    #[tokio::test]
    async fn radio_permit_is_released_after_transaction() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn]);
        let radio = RadioCoordinator::default();
        let mut session =
            DeviceSession::new("Lamp1", "AA", Some(mock.clone()), radio.clone(), TIMEOUT);

        session.write(IsOn, &[1]).await.unwrap();
        assert!(radio.gate().scanning_allowed());
        assert_eq!(radio.available_connects(), 1);

        mock.fail_next(GattOp::Write);
        assert!(session.write(IsOn, &[1]).await.is_err());
        assert_eq!(radio.available_connects(), 1);
    }

    #[tokio::test]
    async fn open_connection_rediscovers_after_missing_characteristic() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn, Brightness]);
        let mut session = session(&mock);
        session.open().await.unwrap();

        let err = session.read(Temperature).await.unwrap_err();
        assert!(matches!(
            err,
            LissabonError::CharacteristicNotFound { kind: Temperature }
        ));
        assert_eq!(session.state(), ConnectionState::Ready);
        assert!(!session.has_cached_characteristics());

        session.read(IsOn).await.unwrap();
        assert_eq!(mock.count(GattOp::Discover), 2);
        assert_eq!(mock.count(GattOp::Connect), 1);
        assert!(mock.is_connected());
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_write_releases_the_radio_on_next_request() {
        let mock = MockPeripheral::new("AA", "id-1", &[IsOn]);
        mock.set_delay(Duration::from_millis(100));
        let radio = RadioCoordinator::default();
        let mut session =
            DeviceSession::new("Lamp1", "AA", Some(mock.clone()), radio.clone(), TIMEOUT);

        let interrupted =
            tokio::time::timeout(Duration::from_millis(250), session.write(IsOn, &[1])).await;
        assert!(interrupted.is_err());
        assert_eq!(session.state(), ConnectionState::Busy);
        assert_eq!(radio.available_connects(), 0);

        tokio::time::timeout(Duration::from_secs(60), session.read(IsOn))
            .await
            .expect("read must not wait for its own radio permit")
            .unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(radio.available_connects(), 1);
        assert!(radio.gate().scanning_allowed());
        assert!(!mock.is_connected());
        assert_eq!(mock.count(GattOp::Discover), 2);
    }
}
