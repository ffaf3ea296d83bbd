use super::*;
use crate::config::{GlassesConfig, LinkConfig};
use crate::error::LinkError;
use crate::events::{EventBus, GlassesEvent};
use crate::settings::{MemorySettingsStore, SettingsStore, KEY_DEVICE_ADDRESS};
use crate::transport::{SimulatedTransport, TransportCall, TransportEvent, TransportEventReceiver};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    machine: Arc<ConnectionStateMachine>,
    transport: Arc<SimulatedTransport>,
    settings: Arc<MemorySettingsStore>,
    events: broadcast::Receiver<GlassesEvent>,
    transport_events: Option<TransportEventReceiver>,
}

fn harness() -> Harness {
    harness_with(GlassesConfig::default().link)
}

fn harness_with(config: LinkConfig) -> Harness {
    let (transport, transport_events) = SimulatedTransport::new();
    let transport = Arc::new(transport);
    let settings = Arc::new(MemorySettingsStore::new());
    let event_bus = Arc::new(EventBus::new(64));
    let events = event_bus.subscribe();

    let machine = Arc::new(ConnectionStateMachine::new(
        transport.clone(),
        settings.clone(),
        event_bus,
        config,
    ));

    Harness {
        machine,
        transport,
        settings,
        events,
        transport_events: Some(transport_events),
    }
}

/// Route link lifecycle events from the transport into the machine
fn pump(machine: Arc<ConnectionStateMachine>, mut events: TransportEventReceiver) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::BondResult { device, success } => {
                    machine.on_bond_result(device, success).await
                }
                TransportEvent::ServiceReady => {
                    let _ = machine.on_initialization_handshake_complete().await;
                }
                TransportEvent::LinkLost => machine.on_link_lost().await,
                TransportEvent::AdapterPoweredOn => machine.on_adapter_powered_on().await,
                TransportEvent::AdapterPoweredOff => machine.on_adapter_powered_off().await,
                _ => {}
            }
        }
    });
}

fn readiness_events(events: &mut broadcast::Receiver<GlassesEvent>) -> Vec<bool> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let GlassesEvent::LinkStatusChanged { ready, .. } = event {
            seen.push(ready);
        }
    }
    seen
}

fn device(address: &str) -> Option<DeviceIdentity> {
    Some(DeviceIdentity::new(address, Some("Glasses".to_string())))
}

#[tokio::test]
async fn test_bond_then_handshake_becomes_ready() {
    let mut h = harness();

    h.machine.on_bond_result(device("AA:BB"), true).await;
    assert_eq!(h.machine.state(), LinkState::Connected);
    assert!(readiness_events(&mut h.events).is_empty());
    assert_eq!(
        h.settings.get(KEY_DEVICE_ADDRESS).as_deref(),
        Some("AA:BB")
    );

    h.machine
        .on_initialization_handshake_complete()
        .await
        .unwrap();

    assert!(h.machine.is_ready());
    assert_eq!(h.transport.enable_calls(), 1);
    assert_eq!(readiness_events(&mut h.events), vec![true]);
    assert_eq!(h.machine.snapshot().address(), Some("AA:BB"));
}

#[tokio::test]
async fn test_handshake_out_of_order_is_ignored() {
    let mut h = harness();

    let err = h
        .machine
        .on_initialization_handshake_complete()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LinkError::OutOfOrderTransition {
            state: LinkState::Disconnected,
            ..
        }
    ));
    assert_eq!(h.machine.state(), LinkState::Disconnected);
    assert_eq!(h.transport.enable_calls(), 0);

    h.machine.on_bond_result(device("AA:BB"), true).await;
    h.machine
        .on_initialization_handshake_complete()
        .await
        .unwrap();

    // A duplicate handshake once Ready must not enable again
    let err = h
        .machine
        .on_initialization_handshake_complete()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LinkError::OutOfOrderTransition {
            state: LinkState::Ready,
            ..
        }
    ));
    assert_eq!(h.transport.enable_calls(), 1);
    assert_eq!(readiness_events(&mut h.events), vec![true]);
}

#[tokio::test]
async fn test_enable_failure_stays_connected() {
    let mut h = harness();
    h.transport.set_enable_failure(Some("gatt write failed"));

    h.machine.on_bond_result(device("AA:BB"), true).await;
    let err = h
        .machine
        .on_initialization_handshake_complete()
        .await
        .unwrap_err();

    assert!(matches!(err, LinkError::Transport(_)));
    assert_eq!(h.machine.state(), LinkState::Connected);
    assert!(readiness_events(&mut h.events).is_empty());

    // At most one enable per physical connection
    h.transport.set_enable_failure(None);
    assert!(h
        .machine
        .on_initialization_handshake_complete()
        .await
        .is_err());
    assert_eq!(h.transport.enable_calls(), 1);

    // A fresh bond is a new connection and may enable again
    h.machine.on_bond_result(device("AA:BB"), true).await;
    h.machine
        .on_initialization_handshake_complete()
        .await
        .unwrap();
    assert!(h.machine.is_ready());
    assert_eq!(h.transport.enable_calls(), 2);
}

#[tokio::test]
async fn test_rebond_while_ready_announces_not_ready() {
    let mut h = harness();
    h.machine.on_bond_result(device("AA:BB"), true).await;
    h.machine
        .on_initialization_handshake_complete()
        .await
        .unwrap();
    let first_generation = h.machine.generation();
    assert_eq!(readiness_events(&mut h.events), vec![true]);

    h.machine.on_bond_result(device("CC:DD"), true).await;

    assert_eq!(h.machine.state(), LinkState::Connected);
    assert!(h.machine.generation() > first_generation);
    assert_eq!(readiness_events(&mut h.events), vec![false]);

    // A rebond from Connected has nothing to retract
    h.machine.on_bond_result(device("EE:FF"), true).await;
    assert!(readiness_events(&mut h.events).is_empty());

    h.machine
        .on_initialization_handshake_complete()
        .await
        .unwrap();
    assert_eq!(readiness_events(&mut h.events), vec![true]);
    assert_eq!(h.machine.snapshot().address(), Some("EE:FF"));
}

#[tokio::test]
async fn test_bond_failure_emits_not_ready() {
    let mut h = harness();

    h.machine.on_bond_result(device("AA:BB"), false).await;
    assert_eq!(h.machine.state(), LinkState::Disconnected);
    assert_eq!(h.machine.identity(), None);
    assert_eq!(readiness_events(&mut h.events), vec![false]);
    assert_eq!(h.settings.get(KEY_DEVICE_ADDRESS), None);
}

#[tokio::test]
async fn test_link_lost_from_ready_clears_identity() {
    let mut h = harness();

    h.machine.on_bond_result(device("AA:BB"), true).await;
    h.machine
        .on_initialization_handshake_complete()
        .await
        .unwrap();
    let generation = h.machine.generation();

    h.machine.on_link_lost().await;

    let snapshot = h.machine.snapshot();
    assert_eq!(snapshot.state, LinkState::Disconnected);
    assert_eq!(snapshot.identity, None);
    assert_eq!(snapshot.generation, generation);
    assert_eq!(readiness_events(&mut h.events), vec![true, false]);
}

#[tokio::test]
async fn test_adapter_power_on_reconnects_to_last_device() {
    let h = harness();

    // Nothing persisted yet
    h.machine.on_adapter_powered_on().await;
    assert_eq!(h.transport.call_count(), 0);

    h.settings.set(KEY_DEVICE_ADDRESS, "AA:BB").unwrap();
    h.machine.on_adapter_powered_on().await;
    assert_eq!(
        h.transport.calls(),
        vec![TransportCall::ConnectDirectly("AA:BB".to_string())]
    );

    // Failures are swallowed
    h.transport.set_unreachable("AA:BB");
    h.machine.on_adapter_powered_on().await;
    assert_eq!(h.machine.state(), LinkState::Disconnected);
}

#[tokio::test]
async fn test_adapter_power_off_disconnects() {
    let mut h = harness();

    h.machine.on_bond_result(device("AA:BB"), true).await;
    h.machine
        .on_initialization_handshake_complete()
        .await
        .unwrap();
    h.machine.on_adapter_powered_off().await;

    assert_eq!(h.machine.state(), LinkState::Disconnected);
    assert!(h.transport.calls().contains(&TransportCall::Disconnect));
    assert_eq!(readiness_events(&mut h.events), vec![true, false]);
}

#[tokio::test]
async fn test_connect_waits_for_ready() {
    let mut h = harness();
    h.transport.set_auto_handshake(true);
    pump(h.machine.clone(), h.transport_events.take().unwrap());

    let snapshot = h.machine.connect("AA:BB").await.unwrap();

    assert_eq!(snapshot.state, LinkState::Ready);
    assert_eq!(snapshot.address(), Some("AA:BB"));
    assert_eq!(h.transport.enable_calls(), 1);
}

#[tokio::test]
async fn test_connect_times_out_without_handshake() {
    let mut config = GlassesConfig::default().link;
    config.connect_timeout_seconds = 1;
    let h = harness_with(config);
    // No pump: bond and service events never reach the machine

    let err = h.machine.connect("AA:BB").await.unwrap_err();
    assert!(matches!(
        err,
        LinkError::ConnectTimeout { timeout, .. } if timeout == Duration::from_secs(1)
    ));
    assert_eq!(h.machine.state(), LinkState::Disconnected);
}

#[tokio::test]
async fn test_connect_nearest_picks_strongest_named_device() {
    let mut h = harness();
    h.transport.set_auto_handshake(true);
    h.transport.set_nearby(vec![
        DiscoveredDevice {
            name: "Far".to_string(),
            address: "11:11".to_string(),
            rssi: -80,
        },
        DiscoveredDevice {
            name: String::new(),
            address: "22:22".to_string(),
            rssi: -10,
        },
        DiscoveredDevice {
            name: "Near".to_string(),
            address: "33:33".to_string(),
            rssi: -40,
        },
    ]);
    pump(h.machine.clone(), h.transport_events.take().unwrap());

    let snapshot = h.machine.connect_nearest().await.unwrap();
    assert_eq!(snapshot.address(), Some("33:33"));
    assert_eq!(
        snapshot.identity.unwrap().display_name.as_deref(),
        Some("Near")
    );
}

#[tokio::test]
async fn test_connect_nearest_without_devices() {
    let h = harness();
    assert_eq!(
        h.machine.connect_nearest().await.unwrap_err(),
        LinkError::NoDeviceFound
    );
    assert_eq!(
        h.machine.reconnect_last().await.unwrap_err(),
        LinkError::NotBonded
    );
}

#[test]
fn test_scan_results_are_deduped_and_sorted() {
    let found = vec![
        DiscoveredDevice {
            name: "A".to_string(),
            address: "01".to_string(),
            rssi: -70,
        },
        DiscoveredDevice {
            name: "A again".to_string(),
            address: "01".to_string(),
            rssi: -20,
        },
        DiscoveredDevice {
            name: "  ".to_string(),
            address: "02".to_string(),
            rssi: -30,
        },
        DiscoveredDevice {
            name: "B".to_string(),
            address: "03".to_string(),
            rssi: -50,
        },
    ];

    let sorted = sort_scan_results(found);
    let addresses: Vec<&str> = sorted.iter().map(|d| d.address.as_str()).collect();
    assert_eq!(addresses, vec!["03", "01"]);
    assert_eq!(sorted[1].name, "A");
}

/// Small deterministic generator for event permutations
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    BondOk,
    BondFailed,
    ServiceReady,
    LinkLost,
    AdapterOff,
}

#[tokio::test]
async fn test_ready_requires_bond_and_enable_for_any_event_order() {
    const STEPS: [Step; 5] = [
        Step::BondOk,
        Step::BondFailed,
        Step::ServiceReady,
        Step::LinkLost,
        Step::AdapterOff,
    ];

    for seed in 1..=200u64 {
        let mut h = harness();
        let mut rng = XorShift(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));

        // Reference model
        let mut model = LinkState::Disconnected;
        let mut enabled_this_link = false;
        let mut expected_enables = 0;
        let mut expected_ready_events = 0;
        let mut ready_events = 0;
        let mut announced_ready = false;

        for _ in 0..24 {
            let step = STEPS[(rng.next() % STEPS.len() as u64) as usize];
            match step {
                Step::BondOk => {
                    h.machine.on_bond_result(device("AA:BB"), true).await;
                    model = LinkState::Connected;
                    enabled_this_link = false;
                }
                Step::BondFailed => {
                    h.machine.on_bond_result(device("AA:BB"), false).await;
                    model = LinkState::Disconnected;
                }
                Step::ServiceReady => {
                    let result = h.machine.on_initialization_handshake_complete().await;
                    if model == LinkState::Connected && !enabled_this_link {
                        assert!(result.is_ok(), "seed {} step {:?}", seed, step);
                        enabled_this_link = true;
                        expected_enables += 1;
                        expected_ready_events += 1;
                        model = LinkState::Ready;
                    } else {
                        assert!(result.is_err(), "seed {} step {:?}", seed, step);
                    }
                }
                Step::LinkLost => {
                    h.machine.on_link_lost().await;
                    model = LinkState::Disconnected;
                }
                Step::AdapterOff => {
                    h.machine.on_adapter_powered_off().await;
                    model = LinkState::Disconnected;
                }
            }

            let snapshot = h.machine.snapshot();
            assert_eq!(snapshot.state, model, "seed {} after {:?}", seed, step);
            assert_eq!(
                snapshot.identity.is_some(),
                model != LinkState::Disconnected,
                "seed {} after {:?}",
                seed,
                step
            );
            assert_eq!(h.transport.enable_calls(), expected_enables);

            // Subscribers always end up with the machine's readiness
            let seen = readiness_events(&mut h.events);
            ready_events += seen.iter().filter(|ready| **ready).count();
            if let Some(last) = seen.last() {
                announced_ready = *last;
            }
            assert_eq!(
                announced_ready,
                model == LinkState::Ready,
                "seed {} after {:?}",
                seed,
                step
            );
        }

        assert_eq!(ready_events, expected_ready_events, "seed {}", seed);
    }
}
