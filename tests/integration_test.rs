// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Integration tests for the coordinator lifecycle against the mock link.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use bedlink::bluetooth::ble_constants::OKIN_SERVICE_UUID;
use bedlink::bluetooth::MockLinkService;
use bedlink::config::{BedConfig, Config};
use bedlink::events::BedEvent;
use bedlink::{
    identify, BedController, BedCoordinator, BedError, Codec, Command, Detection, Direction,
    LinkState, Motor, Preset, ProtocolId, Response, Side,
};

const KEESON_STOP: [u8; 8] = [0xE5, 0xFE, 0x16, 0x00, 0x00, 0x00, 0x00, 0x06];

fn setup(
    protocol: ProtocolId,
    tweak: impl FnOnce(&mut BedConfig),
) -> (Arc<MockLinkService>, Arc<BedCoordinator>) {
    let mut config = BedConfig::new("AA:BB:CC:DD:EE:FF", protocol);
    tweak(&mut config);
    let mock = MockLinkService::new();
    let controller = Arc::new(BedController::new(protocol, Arc::new(config)));
    (mock.clone(), BedCoordinator::new(mock, controller))
}

#[test]
fn test_rondure_head_up_scenario() {
    let codec = Codec::new(ProtocolId::Rondure);
    let packets = codec
        .encode(&Command::motor(Motor::Head, Direction::Up), Side::Both)
        .unwrap();
    let header = [0xE5u8, 0xFE, 0x16, 0x01, 0x00, 0x00, 0x00];
    let sum: u32 = header.iter().map(|b| *b as u32).sum();
    let checksum = (!sum & 0xFF) as u8;

    let mut expected = header.to_vec();
    expected.push(checksum);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].bytes(), expected.as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_third_repeat_sends_single_stop() {
    let (mock, bed) = setup(ProtocolId::Keeson, |_| {});
    bed.connect().await.unwrap();

    let moves = Arc::new(AtomicUsize::new(0));
    let counter = moves.clone();
    let weak = Arc::downgrade(&bed);
    mock.on_write(move |_, bytes| {
        if bytes[3] == 0x01 && counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
            if let Some(bed) = weak.upgrade() {
                bed.cancel_current();
            }
        }
    });

    let response = bed.move_motor(Motor::Head, Direction::Up).await.unwrap();
    assert_eq!(response, Response::Cancelled);

    let writes = mock.written_bytes();
    assert_eq!(moves.load(Ordering::SeqCst), 3);
    assert_eq!(writes.len(), 4);
    assert_eq!(writes.last().unwrap().as_slice(), &KEESON_STOP);
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_preempts_running_move() {
    let (mock, bed) = setup(ProtocolId::Keeson, |_| {});
    bed.connect().await.unwrap();

    let mover = bed.clone();
    let held = tokio::spawn(async move { mover.move_motor(Motor::Feet, Direction::Down).await });
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(bed.stop_all().await.unwrap(), Response::Done);
    assert_eq!(held.await.unwrap().unwrap(), Response::Cancelled);

    let writes = mock.written_bytes();
    let first_stop = writes.iter().position(|w| w == &KEESON_STOP).unwrap();
    assert_eq!(first_stop, 3);
    assert!(writes[first_stop..].iter().all(|w| w == &KEESON_STOP));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_commands_do_not_interleave() {
    let (mock, bed) = setup(ProtocolId::Keeson, |c| c.timing.motor_pulse_count = 5);

    let a = bed.clone();
    let b = bed.clone();
    let first = tokio::spawn(async move { a.move_motor(Motor::Head, Direction::Up).await });
    let second = tokio::spawn(async move { b.move_motor(Motor::Feet, Direction::Up).await });
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let writes = mock.written_bytes();
    assert_eq!(writes.len(), 12);
    // Each command is five moves then its stop, back to back.
    for block in writes.chunks(6) {
        let code = block[0][3];
        assert!(code == 0x01 || code == 0x04);
        assert!(block[..5].iter().all(|w| w[3] == code));
        assert_eq!(block[5].as_slice(), &KEESON_STOP);
    }
    assert_ne!(writes[0][3], writes[6][3]);
}

#[tokio::test(start_paused = true)]
async fn test_idle_disconnect_sets_intentional_flag() {
    let (mock, bed) = setup(ProtocolId::Keeson, |c| c.timing.idle_timeout_secs = 10);
    let session = bed.session().clone();
    let flagged = Arc::new(AtomicBool::new(false));
    let seen = flagged.clone();
    mock.on_disconnect(move || seen.store(session.is_intentional(), Ordering::SeqCst));
    let mut events = bed.subscribe_events();

    bed.goto_preset(Preset::Flat).await.unwrap();
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(bed.state(), LinkState::Connected);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(bed.state(), LinkState::Disconnected);
    assert!(flagged.load(Ordering::SeqCst));
    assert!(!bed.session().is_intentional());
    assert_eq!(mock.disconnects(), 1);
    assert_eq!(mock.connect_attempts(), 1);

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let BedEvent::LinkStateChanged { state } = event {
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![
            LinkState::Connecting,
            LinkState::Connected,
            LinkState::Idle,
            LinkState::Disconnecting,
            LinkState::Disconnected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_long_command_is_not_cut_by_idle_timer() {
    let (mock, bed) = setup(ProtocolId::Keeson, |c| {
        c.timing.idle_timeout_secs = 1;
        c.timing.motor_pulse_count = 30;
    });
    bed.move_motor(Motor::Head, Direction::Up).await.unwrap();

    assert_eq!(mock.written_bytes().len(), 31);
    assert_eq!(mock.disconnects(), 0);
    assert_eq!(bed.state(), LinkState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_retries_with_backoff() {
    let (mock, bed) = setup(ProtocolId::Keeson, |_| {});
    mock.fail_next_connects(2);

    let start = Instant::now();
    bed.connect().await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_millis(12_500));
    assert_eq!(mock.connect_attempts(), 3);
    assert_eq!(bed.session().retries(), 0);
    assert_eq!(bed.state(), LinkState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_gives_up_after_ceiling() {
    let (mock, bed) = setup(ProtocolId::Keeson, |_| {});
    mock.fail_next_connects(5);

    let err = bed.goto_preset(Preset::Flat).await.unwrap_err();
    assert!(matches!(
        err,
        BedError::ConnectionFailure { attempts: 3, .. }
    ));
    assert_eq!(bed.state(), LinkState::Disconnected);
    assert_eq!(mock.connect_attempts(), 3);
    assert!(mock.written_bytes().is_empty());

    // Safe to retry right away.
    mock.fail_next_connects(0);
    bed.goto_preset(Preset::Flat).await.unwrap();
    assert_eq!(bed.state(), LinkState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_link_loss_reconnects() {
    let (mock, bed) = setup(ProtocolId::Keeson, |_| {});
    bed.connect().await.unwrap();

    mock.drop_link();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(mock.connect_attempts(), 2);
    assert!(mock.is_connected());
    assert_eq!(bed.state(), LinkState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_without_auto_reconnect() {
    let (mock, bed) = setup(ProtocolId::Keeson, |c| c.auto_reconnect = false);
    bed.connect().await.unwrap();

    mock.drop_link();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(bed.state(), LinkState::Disconnected);
    assert_eq!(mock.connect_attempts(), 1);

    // The next command connects on demand.
    bed.goto_preset(Preset::Flat).await.unwrap();
    assert_eq!(mock.connect_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_disconnect_does_not_reconnect() {
    let (mock, bed) = setup(ProtocolId::Keeson, |_| {});
    bed.connect().await.unwrap();

    bed.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(bed.state(), LinkState::Disconnected);
    assert_eq!(mock.connect_attempts(), 1);
    assert!(!bed.session().is_intentional());
}

#[tokio::test(start_paused = true)]
async fn test_write_timeout_keeps_session() {
    let (mock, bed) = setup(ProtocolId::Keeson, |_| {});
    bed.connect().await.unwrap();

    mock.stall_writes(true);
    let err = bed.goto_preset(Preset::Flat).await.unwrap_err();
    assert!(matches!(err, BedError::WriteTimeout { .. }));
    assert!(err.is_transient());
    assert_eq!(bed.state(), LinkState::Connected);
    assert_eq!(mock.disconnects(), 0);

    mock.stall_writes(false);
    bed.goto_preset(Preset::Flat).await.unwrap();
    assert_eq!(mock.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_beds_have_independent_sessions() {
    let (mock_a, bed_a) = setup(ProtocolId::Keeson, |_| {});
    let (mock_b, bed_b) = setup(ProtocolId::Linak, |c| c.address = "11:22:33:44:55:66".into());

    bed_a.goto_preset(Preset::Flat).await.unwrap();
    assert_eq!(bed_a.state(), LinkState::Connected);
    assert_eq!(bed_b.state(), LinkState::Disconnected);
    assert_eq!(mock_b.connect_attempts(), 0);

    bed_a.disconnect().await.unwrap();
    bed_b.stop_all().await.unwrap();
    assert_eq!(bed_b.address(), "11:22:33:44:55:66");
    assert_eq!(mock_a.disconnects(), 1);
    assert_eq!(bed_b.state(), LinkState::Connected);
}

#[test]
fn test_detector_is_deterministic_for_shared_service() {
    for _ in 0..50 {
        assert_eq!(
            identify(&[OKIN_SERVICE_UUID], Some("Okimat 4")),
            Detection::Protocol(ProtocolId::OkinUuid)
        );
    }
    assert!(matches!(
        identify(&[OKIN_SERVICE_UUID], None),
        Detection::Ambiguous(_)
    ));
}

#[test]
fn test_config_file_drives_controller() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[beds]]
address = "AA:BB:CC:00:11:22"
protocol = "okin-cb24"
side = "right"

[beds.timing]
motor_pulse_count = 3
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    let bed = config.bed("aa:bb:cc:00:11:22").cloned().unwrap();
    assert_eq!(bed.timing.motor_pulse_delay_ms, 100);

    let controller = BedController::from_config(Arc::new(bed)).unwrap();
    let plan = controller
        .plan(&Command::motor(Motor::Head, Direction::Up))
        .unwrap();
    assert_eq!(plan.repeat.count, 3);
    assert_eq!(*plan.packets[0].bytes().last().unwrap(), 0xBB);
}
