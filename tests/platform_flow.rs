use std::sync::Arc;
use std::time::Duration;

use lissabon_bridge_lib::config::{LissabonConfig, LissabonOptions};
use lissabon_bridge_lib::core::bluetooth::mock::{GattOp, MockPeripheral};
use lissabon_bridge_lib::core::bluetooth::{
    CharacteristicKind, ConnectionState, DeviceType, Discovery, LightValue, RadioCoordinator, probe,
};
use lissabon_bridge_lib::core::error::HapStatus;
use lissabon_bridge_lib::platform::{DiscoveryPolicy, InMemoryRegistry, LaunchMode, LissabonPlatform};
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_millis(500);

fn ble_discovery_config() -> LissabonConfig {
    LissabonConfig {
        options: Some(LissabonOptions {
            discover_ble: true,
            ..LissabonOptions::default()
        }),
        ..LissabonConfig::default()
    }
}

#[tokio::test]
async fn discovered_dimmer_is_registered_and_controllable() {
    let radio = RadioCoordinator::default();
    let registry = Arc::new(InMemoryRegistry::new());
    let platform: LissabonPlatform<MockPeripheral, _> =
        LissabonPlatform::new(ble_discovery_config(), registry.clone(), radio.clone()).unwrap();
    assert_eq!(platform.did_finish_launching().await.unwrap(), LaunchMode::BleDiscovery);

    let lamp = MockPeripheral::new(
        "AA:BB:CC:DD:EE:01",
        "session-1",
        &[CharacteristicKind::IsOn, CharacteristicKind::Brightness],
    );
    let descriptor = probe(&lamp, "Lamp1", &radio, TIMEOUT).await.unwrap().unwrap();
    assert_eq!(descriptor.device_type, DeviceType::Dimmer);
    assert!(!lamp.is_connected());

    let (tx, rx) = mpsc::channel(1);
    tx.send(Discovery {
        descriptor,
        peripheral: lamp.clone(),
    })
    .await
    .unwrap();
    drop(tx);
    platform.run_discovery(rx, DiscoveryPolicy::RegisterAll).await;

    let accessories = registry.accessories().await;
    assert_eq!(accessories.len(), 1);
    assert_eq!(accessories[0].display_name, "Lamp1");
    assert_eq!(accessories[0].info.model, "dimmer");

    let light = platform.handler("AA:BB:CC:DD:EE:01").await.unwrap();
    light.set(LightValue::Brightness(300)).await.unwrap();
    assert_eq!(lamp.value(CharacteristicKind::Brightness), Some(vec![0x2c, 0x01]));

    lamp.set_value(CharacteristicKind::IsOn, vec![1]);
    assert_eq!(
        light.get(CharacteristicKind::IsOn).await.unwrap(),
        LightValue::On(true)
    );

    let executor = light.as_ble().unwrap();
    assert_eq!(executor.state().await, ConnectionState::Disconnected);
    assert_eq!(executor.last_known().brightness, 300);
    assert!(executor.last_known().is_on);

    let connects = lamp.count(GattOp::Connect);
    light
        .set_all(&[LightValue::On(false), LightValue::Brightness(10)])
        .await
        .unwrap();
    assert_eq!(lamp.count(GattOp::Connect), connects + 1);
    assert_eq!(lamp.value(CharacteristicKind::IsOn), Some(vec![0]));
    assert_eq!(executor.last_known().brightness, 10);
    assert!(!lamp.is_connected());
    assert!(!lamp.overlapped());
}

#[tokio::test]
async fn failed_read_surfaces_communication_failure() {
    let radio = RadioCoordinator::default();
    let platform: LissabonPlatform<MockPeripheral, _> = LissabonPlatform::new(
        ble_discovery_config(),
        Arc::new(InMemoryRegistry::new()),
        radio.clone(),
    )
    .unwrap();

    let lamp = MockPeripheral::new("AA:BB:CC:DD:EE:02", "session-2", &CharacteristicKind::ALL);
    let descriptor = probe(&lamp, "", &radio, TIMEOUT).await.unwrap().unwrap();
    assert_eq!(descriptor.name, "AA:BB:CC:DD:EE:02");
    let light = platform
        .register_device(descriptor, Some(lamp.clone()))
        .await
        .unwrap();

    lamp.fail_next(GattOp::Read);
    let err = light.get_temperature().await.unwrap_err();
    assert!(err.is_unreachable());
    assert_eq!(err.status(), HapStatus::ServiceCommunicationFailure);
    assert_eq!(err.status().code(), -70402);
    assert!(!lamp.is_connected());
    assert_eq!(radio.available_connects(), 1);

    lamp.set_value(CharacteristicKind::Temperature, vec![0xfa, 0x00]);
    assert_eq!(light.get_temperature().await.unwrap(), 250);
}

#[tokio::test]
async fn configured_light_without_peripheral_is_not_discovered() {
    let mut config = LissabonConfig::default();
    config.options = Some(LissabonOptions {
        devices: vec![lissabon_bridge_lib::core::bluetooth::DeviceDescriptor {
            address: "AA:BB:CC:DD:EE:03".to_string(),
            name: "Hall".to_string(),
            device_type: DeviceType::Ledstrip,
            has_brightness: true,
            has_temperature: true,
            is_bluetooth: true,
        }],
        ..LissabonOptions::default()
    });
    let platform: LissabonPlatform<MockPeripheral, _> =
        LissabonPlatform::new(config, Arc::new(InMemoryRegistry::new()), RadioCoordinator::default())
            .unwrap();
    assert_eq!(platform.did_finish_launching().await.unwrap(), LaunchMode::Static);

    let light = platform.handler("AA:BB:CC:DD:EE:03").await.unwrap();
    let err = light.set_on(true).await.unwrap_err();
    assert_eq!(err.status(), HapStatus::ServiceCommunicationFailure);

    let lamp = MockPeripheral::new("AA:BB:CC:DD:EE:03", "session-3", &CharacteristicKind::ALL);
    let (tx, rx) = mpsc::channel(1);
    tx.send(Discovery {
        descriptor: platform.handler("AA:BB:CC:DD:EE:03").await.unwrap().descriptor().clone(),
        peripheral: lamp.clone(),
    })
    .await
    .unwrap();
    drop(tx);
    platform.run_discovery(rx, DiscoveryPolicy::AttachKnown).await;

    light.set_on(true).await.unwrap();
    assert_eq!(lamp.value(CharacteristicKind::IsOn), Some(vec![1]));
}
