use super::*;
use crate::config::GlassesConfig;
use crate::error::CommandError;
use crate::events::{EventBus, GlassesEvent};
use crate::link::{ConnectionStateMachine, DeviceIdentity, LinkState};
use crate::settings::MemorySettingsStore;
use crate::transport::{
    LinkTransport, ScriptedResponse, SimulatedTransport, TransportEvent, TransportEventReceiver,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    dispatcher: Arc<CommandDispatcher>,
    machine: Arc<ConnectionStateMachine>,
    transport: Arc<SimulatedTransport>,
    events: broadcast::Receiver<GlassesEvent>,
    transport_events: TransportEventReceiver,
}

fn harness(timeout: Duration) -> Harness {
    let (transport, transport_events) = SimulatedTransport::new();
    let transport = Arc::new(transport);
    let event_bus = Arc::new(EventBus::new(64));
    let events = event_bus.subscribe();

    let machine = Arc::new(ConnectionStateMachine::new(
        transport.clone(),
        Arc::new(MemorySettingsStore::new()),
        event_bus.clone(),
        GlassesConfig::default().link,
    ));
    let dispatcher = Arc::new(CommandDispatcher::new(
        machine.clone(),
        transport.clone(),
        event_bus,
        timeout,
    ));

    Harness {
        dispatcher,
        machine,
        transport,
        events,
        transport_events,
    }
}

async fn make_ready(h: &Harness) {
    h.transport.connect_directly("AA:BB").await.unwrap();
    h.machine
        .on_bond_result(Some(DeviceIdentity::new("AA:BB", None)), true)
        .await;
    h.machine
        .on_initialization_handshake_complete()
        .await
        .unwrap();
}

fn command_results(events: &mut broadcast::Receiver<GlassesEvent>) -> Vec<(String, bool)> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let GlassesEvent::CommandCompleted {
            command, success, ..
        } = event
        {
            seen.push((command, success));
        }
    }
    seen
}

#[tokio::test]
async fn test_commands_refused_without_io_when_not_ready() {
    let h = harness(Duration::from_secs(1));
    let not_ready = CommandError::NotReady {
        state: LinkState::Disconnected,
    };

    assert_eq!(h.dispatcher.take_photo().await.unwrap_err(), not_ready);
    assert_eq!(h.dispatcher.toggle_video().await.unwrap_err(), not_ready);
    assert_eq!(h.dispatcher.toggle_audio().await.unwrap_err(), not_ready);
    assert_eq!(h.dispatcher.sync_time().await.unwrap_err(), not_ready);
    assert_eq!(h.dispatcher.request_battery().await.unwrap_err(), not_ready);
    assert_eq!(h.dispatcher.device_info().await.unwrap_err(), not_ready);
    assert_eq!(h.dispatcher.media_counts().await.unwrap_err(), not_ready);

    assert_eq!(h.transport.call_count(), 0);
    assert_eq!(h.dispatcher.video_toggle().state(), ToggleState::Idle(false));
    assert_eq!(h.dispatcher.audio_toggle().state(), ToggleState::Idle(false));
}

#[tokio::test]
async fn test_commands_refused_while_connected_but_not_enabled() {
    let h = harness(Duration::from_secs(1));
    h.machine
        .on_bond_result(Some(DeviceIdentity::new("AA:BB", None)), true)
        .await;

    assert_eq!(
        h.dispatcher.take_photo().await.unwrap_err(),
        CommandError::NotReady {
            state: LinkState::Connected
        }
    );
    assert!(h.transport.sent_frames().is_empty());
}

#[tokio::test]
async fn test_video_toggle_commits_on_success() {
    let mut h = harness(Duration::from_secs(1));
    make_ready(&h).await;

    assert!(h.dispatcher.toggle_video().await.unwrap());
    assert!(h.dispatcher.is_recording_video());
    assert_eq!(
        h.dispatcher.video_toggle().state(),
        ToggleState::Committed(true)
    );

    assert!(!h.dispatcher.toggle_video().await.unwrap());
    assert!(!h.dispatcher.is_recording_video());

    assert_eq!(
        h.transport.sent_frames(),
        vec![vec![0x02, 0x01, 0x02], vec![0x02, 0x01, 0x03]]
    );
    assert_eq!(
        command_results(&mut h.events),
        vec![
            ("video start".to_string(), true),
            ("video stop".to_string(), true)
        ]
    );
}

#[tokio::test]
async fn test_video_toggle_reverts_on_rejection() {
    let h = harness(Duration::from_secs(1));
    make_ready(&h).await;
    h.transport.set_response(
        CommandFrame::VideoStart,
        ScriptedResponse::Reply(CommandResponse::rejected(2, 5)),
    );

    let err = h.dispatcher.toggle_video().await.unwrap_err();

    assert_eq!(
        err,
        CommandError::Rejected {
            command: "video start",
            data_type: 2,
            error_code: 5
        }
    );
    assert!(!h.dispatcher.is_recording_video());
    assert_eq!(
        h.dispatcher.video_toggle().state(),
        ToggleState::Reverted(false)
    );
}

#[tokio::test]
async fn test_audio_toggle_reverts_on_timeout() {
    let h = harness(Duration::from_millis(100));
    make_ready(&h).await;
    h.transport
        .set_response(CommandFrame::AudioStart, ScriptedResponse::Silent);

    let err = h.dispatcher.toggle_audio().await.unwrap_err();

    assert!(matches!(
        err,
        CommandError::Timeout {
            command: "audio start",
            ..
        }
    ));
    assert!(!h.dispatcher.is_recording_audio());
    assert_eq!(h.transport.sent_frames(), vec![vec![0x02, 0x01, 0x08]]);
}

#[tokio::test]
async fn test_overlapping_toggle_is_rejected_without_io() {
    let h = harness(Duration::from_secs(2));
    make_ready(&h).await;
    h.transport.set_response(
        CommandFrame::VideoStart,
        ScriptedResponse::ReplyAfter(Duration::from_millis(300), CommandResponse::accepted()),
    );

    let dispatcher = h.dispatcher.clone();
    let first = tokio::spawn(async move { dispatcher.toggle_video().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The optimistic flag is already visible
    assert!(h.dispatcher.is_recording_video());
    assert_eq!(
        h.dispatcher.toggle_video().await.unwrap_err(),
        CommandError::ToggleInFlight { mode: "video" }
    );
    assert_eq!(h.transport.sent_frames().len(), 1);

    assert!(first.await.unwrap().unwrap());
    assert_eq!(
        h.dispatcher.video_toggle().state(),
        ToggleState::Committed(true)
    );
}

#[tokio::test]
async fn test_response_after_link_lost_is_discarded() {
    let h = harness(Duration::from_secs(2));
    make_ready(&h).await;
    h.transport.set_response(
        CommandFrame::CapturePhoto,
        ScriptedResponse::ReplyAfter(Duration::from_millis(150), CommandResponse::accepted()),
    );

    let dispatcher = h.dispatcher.clone();
    let pending = tokio::spawn(async move { dispatcher.take_photo().await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.machine.on_link_lost().await;

    assert_eq!(
        pending.await.unwrap().unwrap_err(),
        CommandError::Discarded { command: "photo" }
    );
}

#[tokio::test]
async fn test_response_from_previous_connection_is_discarded() {
    let h = harness(Duration::from_secs(2));
    make_ready(&h).await;
    h.transport.set_response(
        CommandFrame::AudioStart,
        ScriptedResponse::ReplyAfter(Duration::from_millis(150), CommandResponse::accepted()),
    );

    let dispatcher = h.dispatcher.clone();
    let pending = tokio::spawn(async move { dispatcher.toggle_audio().await });
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Drop and re-establish before the reply lands
    h.machine.on_link_lost().await;
    make_ready(&h).await;
    assert!(h.machine.is_ready());

    assert_eq!(
        pending.await.unwrap().unwrap_err(),
        CommandError::Discarded {
            command: "audio start"
        }
    );
    assert!(!h.dispatcher.is_recording_audio());
}

#[tokio::test]
async fn test_media_counts_and_summary() {
    let h = harness(Duration::from_secs(1));
    make_ready(&h).await;

    assert_eq!(h.dispatcher.media_summary().await.unwrap(), None);

    h.transport.set_media_counts(MediaCounts {
        photos: 3,
        videos: 1,
        audio: 0,
    });
    let counts = h.dispatcher.media_counts().await.unwrap();
    assert_eq!(counts.total(), 4);

    let summary = h.dispatcher.media_summary().await.unwrap().unwrap();
    assert!(summary.contains("Photos: 3"));
    assert!(summary.contains("Videos: 1"));
    assert!(summary.contains("Audio: 0"));
    assert!(h
        .transport
        .sent_frames()
        .iter()
        .all(|frame| frame == &vec![0x02, 0x04]));
}

#[tokio::test]
async fn test_device_info_time_sync_and_battery() {
    let mut h = harness(Duration::from_secs(1));
    make_ready(&h).await;
    h.transport.set_battery(60, true);

    let info = h.dispatcher.device_info().await.unwrap();
    assert_eq!(info.summary(), "HW:SIM-HW-1 FW:SIM-FW-1");

    h.dispatcher.sync_time().await.unwrap();
    h.dispatcher.request_battery().await.unwrap();

    let mut battery = None;
    while let Ok(event) = h.transport_events.try_recv() {
        if let TransportEvent::BatteryReport { level, charging } = event {
            battery = Some((level, charging));
        }
    }
    assert_eq!(battery, Some((60, true)));
}

#[tokio::test]
async fn test_transport_failure_is_reported() {
    let mut h = harness(Duration::from_secs(1));
    make_ready(&h).await;
    h.transport.set_response(
        CommandFrame::CapturePhoto,
        ScriptedResponse::Fail(crate::error::TransportError::SendFailed {
            details: "write rejected".to_string(),
        }),
    );

    let err = h.dispatcher.take_photo().await.unwrap_err();
    assert!(matches!(err, CommandError::Transport(_)));
    assert_eq!(
        command_results(&mut h.events),
        vec![("photo".to_string(), false)]
    );
}
