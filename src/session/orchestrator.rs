use super::types::ShutdownReason;
use crate::command::CommandDispatcher;
use crate::config::GlassesConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::link::ConnectionStateMachine;
use crate::settings::{SettingsStore, UploadSettings};
use crate::transport::{LinkTransport, TransportEventReceiver};
use crate::upload::{EventBusUploadListener, PhotoUploader, UploadPipeline};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owner of every component for one companion session
pub struct GlassesSession {
    pub(super) config: GlassesConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) link: Arc<ConnectionStateMachine>,
    pub(super) dispatcher: Arc<CommandDispatcher>,
    pub(super) uploads: Arc<UploadPipeline>,
    pub(super) settings: UploadSettings,

    // Lifecycle management
    pub(super) transport_events: Mutex<Option<TransportEventReceiver>>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Mutex<Option<oneshot::Receiver<ShutdownReason>>>,
    pub(super) cancellation_token: CancellationToken,
}

impl GlassesSession {
    /// Wire the components around an already constructed transport
    pub fn new(
        config: GlassesConfig,
        transport: Arc<dyn LinkTransport>,
        transport_events: TransportEventReceiver,
        settings_store: Arc<dyn SettingsStore>,
        uploader: Arc<dyn PhotoUploader>,
    ) -> Result<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let link = Arc::new(ConnectionStateMachine::new(
            Arc::clone(&transport),
            Arc::clone(&settings_store),
            Arc::clone(&event_bus),
            config.link.clone(),
        ));

        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&link),
            transport,
            Arc::clone(&event_bus),
            config.command.response_timeout(),
        ));

        let settings = UploadSettings::new(settings_store);
        let uploads = Arc::new(UploadPipeline::new(
            settings.clone(),
            uploader,
            Arc::new(EventBusUploadListener::new(Arc::clone(&event_bus))),
            config.upload.photo_dirs(),
        ));

        info!(
            "Session ready: {} photo directories, command timeout {:?}",
            config.upload.photo_dirs.len(),
            config.command.response_timeout()
        );

        Ok(Self {
            config,
            event_bus,
            link,
            dispatcher,
            uploads,
            settings,
            transport_events: Mutex::new(Some(transport_events)),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Mutex::new(Some(shutdown_receiver)),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &GlassesConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn link(&self) -> &ConnectionStateMachine {
        &self.link
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn uploads(&self) -> &UploadPipeline {
        &self.uploads
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
