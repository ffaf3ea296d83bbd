use super::state::{sort_scan_results, DeviceIdentity, DiscoveredDevice, LinkSnapshot, LinkState};
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::events::{EventBus, GlassesEvent};
use crate::settings::{SettingsStore, KEY_DEVICE_ADDRESS};
use crate::transport::LinkTransport;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Bookkeeping guarded by the transition lock
struct TransitionState {
    /// Generation for which `enable` has already been issued
    enabled_generation: Option<u64>,
}

/// Owner of the canonical link readiness.
///
/// Only the `on_*` transition functions mutate the state, one at a time
/// under the transition lock. Readiness events go out on the event bus after
/// the lock is released.
pub struct ConnectionStateMachine {
    state: watch::Sender<LinkSnapshot>,
    transitions: Mutex<TransitionState>,
    transport: Arc<dyn LinkTransport>,
    settings: Arc<dyn SettingsStore>,
    event_bus: Arc<EventBus>,
    config: LinkConfig,
}

impl ConnectionStateMachine {
    pub fn new(
        transport: Arc<dyn LinkTransport>,
        settings: Arc<dyn SettingsStore>,
        event_bus: Arc<EventBus>,
        config: LinkConfig,
    ) -> Self {
        let (state, _) = watch::channel(LinkSnapshot::disconnected(0));

        Self {
            state,
            transitions: Mutex::new(TransitionState {
                enabled_generation: None,
            }),
            transport,
            settings,
            event_bus,
            config,
        }
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        self.state.borrow().clone()
    }

    pub fn state(&self) -> LinkState {
        self.state.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.state.borrow().identity.clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Watch every committed transition
    pub fn subscribe(&self) -> watch::Receiver<LinkSnapshot> {
        self.state.subscribe()
    }

    /// Bond outcome reported by the transport
    pub async fn on_bond_result(&self, device: Option<DeviceIdentity>, success: bool) {
        let bonded = match (success, device) {
            (true, Some(identity)) => {
                let _transitions = self.transitions.lock();
                let previous = self.snapshot();
                if previous.state != LinkState::Disconnected {
                    warn!(
                        "Bond succeeded while {:?}; treating it as a new connection",
                        previous.state
                    );
                }
                let generation = previous.generation + 1;
                info!(
                    "Bonded with {} ({}), generation {}",
                    identity.label(),
                    identity.address,
                    generation
                );
                self.state.send_replace(LinkSnapshot {
                    state: LinkState::Connected,
                    identity: Some(identity.clone()),
                    generation,
                });
                Some((identity, previous.state == LinkState::Ready))
            }
            (true, None) => {
                warn!("Bond reported success without a device identity; treating as failure");
                None
            }
            (false, _) => None,
        };

        match bonded {
            Some((identity, was_ready)) => {
                if let Err(e) = self.settings.set(KEY_DEVICE_ADDRESS, &identity.address) {
                    warn!("Failed to persist device address: {}", e);
                }
                if was_ready {
                    self.event_bus
                        .notify(GlassesEvent::LinkStatusChanged {
                            ready: false,
                            address: Some(identity.address),
                            timestamp: SystemTime::now(),
                        })
                        .await;
                }
            }
            None => {
                warn!("Bond failed");
                self.drop_to_disconnected().await;
            }
        }
    }

    /// Service handshake finished; issue the one-time enable call and become Ready
    pub async fn on_initialization_handshake_complete(&self) -> Result<(), LinkError> {
        let generation = {
            let mut transitions = self.transitions.lock();
            let snapshot = self.snapshot();
            if snapshot.state != LinkState::Connected {
                return Err(LinkError::OutOfOrderTransition {
                    transition: "handshake_complete",
                    state: snapshot.state,
                });
            }
            if transitions.enabled_generation == Some(snapshot.generation) {
                // enable already issued for this connection and it failed
                return Err(LinkError::OutOfOrderTransition {
                    transition: "handshake_complete",
                    state: snapshot.state,
                });
            }
            transitions.enabled_generation = Some(snapshot.generation);
            snapshot.generation
        };

        debug!("Enabling device for generation {}", generation);
        if let Err(e) = self.transport.enable().await {
            error!("Device enable call failed: {}", e);
            return Err(LinkError::Transport(e));
        }

        let address = {
            let _transitions = self.transitions.lock();
            let snapshot = self.snapshot();
            if snapshot.state != LinkState::Connected || snapshot.generation != generation {
                warn!("Link changed while enabling; readiness not granted");
                return Err(LinkError::OutOfOrderTransition {
                    transition: "enable_complete",
                    state: snapshot.state,
                });
            }
            self.state.send_modify(|s| s.state = LinkState::Ready);
            snapshot.address().map(str::to_string)
        };

        self.event_bus
            .notify(GlassesEvent::LinkStatusChanged {
                ready: true,
                address,
                timestamp: SystemTime::now(),
            })
            .await;

        Ok(())
    }

    /// The physical link dropped; valid from any state
    pub async fn on_link_lost(&self) {
        info!("Link lost");
        self.drop_to_disconnected().await;
    }

    /// Best-effort reconnect to the last bonded device
    pub async fn on_adapter_powered_on(&self) {
        if !self.config.auto_reconnect {
            debug!("Adapter powered on; auto reconnect disabled");
            return;
        }
        if self.state() != LinkState::Disconnected {
            debug!("Adapter powered on while linked; nothing to do");
            return;
        }

        let Some(address) = self.settings.get(KEY_DEVICE_ADDRESS) else {
            debug!("Adapter powered on; no previously bonded device");
            return;
        };

        info!("Adapter powered on; reconnecting to {}", address);
        if let Err(e) = self.transport.connect_directly(&address).await {
            warn!("Auto reconnect to {} failed: {}", address, e);
        }
    }

    pub async fn on_adapter_powered_off(&self) {
        info!("Adapter powered off");
        self.drop_to_disconnected().await;
        if let Err(e) = self.transport.disconnect().await {
            debug!("Transport disconnect after power off failed: {}", e);
        }
    }

    /// Connect to `address` and wait until the link is Ready
    pub async fn connect(&self, address: &str) -> Result<LinkSnapshot, LinkError> {
        let mut watcher = self.state.subscribe();
        let timeout = self.config.connect_timeout();

        info!("Connecting to {}", address);
        self.transport.connect_directly(address).await?;

        let ready = tokio::time::timeout(
            timeout,
            watcher.wait_for(|s| s.is_ready() && s.address() == Some(address)),
        )
        .await;

        match ready {
            Ok(Ok(snapshot)) => Ok(snapshot.clone()),
            Ok(Err(_)) | Err(_) => {
                warn!("Connection to {} not ready after {:?}", address, timeout);
                Err(LinkError::ConnectTimeout {
                    address: address.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Scan and connect to the strongest named device
    pub async fn connect_nearest(&self) -> Result<LinkSnapshot, LinkError> {
        let devices = self.scan().await?;
        let nearest = devices.first().ok_or(LinkError::NoDeviceFound)?;
        info!("Nearest device: {} ({} dBm)", nearest.name, nearest.rssi);
        self.connect(&nearest.address).await
    }

    /// Connect to the address persisted by the last successful bond
    pub async fn reconnect_last(&self) -> Result<LinkSnapshot, LinkError> {
        let address = self
            .settings
            .get(KEY_DEVICE_ADDRESS)
            .ok_or(LinkError::NotBonded)?;
        self.connect(&address).await
    }

    /// Explicit unbind
    pub async fn disconnect(&self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Transport disconnect failed: {}", e);
        }
        self.drop_to_disconnected().await;
    }

    pub async fn scan(&self) -> Result<Vec<DiscoveredDevice>, LinkError> {
        let found = self.transport.scan(self.config.scan_timeout()).await?;
        let devices = sort_scan_results(found);
        debug!("Scan found {} named devices", devices.len());
        Ok(devices)
    }

    async fn drop_to_disconnected(&self) {
        {
            let _transitions = self.transitions.lock();
            let generation = self.state.borrow().generation;
            self.state
                .send_replace(LinkSnapshot::disconnected(generation));
        }

        self.event_bus
            .notify(GlassesEvent::LinkStatusChanged {
                ready: false,
                address: None,
                timestamp: SystemTime::now(),
            })
            .await;
    }
}
