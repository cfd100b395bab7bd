//! Integration tests for the report stream: notifications delivered to a
//! `Session` come out as adapter events, and streamed reports merge.

use std::time::{Duration, UNIX_EPOCH};

use async_io_mini::Timer;

use crate::mock_channel::MockDevice;

use iotile_ble::adapters::time::ManualClock;
use iotile_ble::events::{AdapterEvent, ReportParserEvent};
use iotile_ble::reports::individual::encode_individual_report;
use iotile_ble::reports::selector::{SYSTEM_OUTPUTS, USER_OUTPUTS};
use iotile_ble::reports::signed_list::{
    COMBINED_REPORT_STREAMER, SYSTEM_REPORT_STREAMER, USER_REPORT_STREAMER, encode_list_report,
};
use iotile_ble::reports::{Reading, ReportMerger, SignedListReport, Validity};
use iotile_ble::rpc::Characteristic;
use iotile_ble::{Session, StackConfig};

const DEVICE: u32 = 0x2A;

fn open_session(config: &StackConfig) -> (Session<MockDevice, ManualClock>, ManualClock) {
    let clock = ManualClock::at_secs(50_000);
    let session = Session::with_clock(MockDevice::default(), config, clock.clone()).unwrap();
    session.open().unwrap();
    (session, clock)
}

/// Deliver `data` in BLE-sized notifications.
fn stream(device: &MockDevice, data: &[u8]) {
    for chunk in data.chunks(20) {
        assert!(device.deliver(Characteristic::Streaming, chunk));
    }
}

fn robust_reports(events: &[AdapterEvent]) -> Vec<SignedListReport> {
    events
        .iter()
        .filter_map(|e| match e {
            AdapterEvent::RawRobustReport(r) => Some(r.clone()),
            _ => None,
        })
        .collect()
}

// ── Realtime ─────────────────────────────────────────────────

#[test]
fn realtime_reading_arrives_as_event() {
    let (session, _) = open_session(&StackConfig::default());
    let device = session.channel();
    stream(device, &encode_individual_report(DEVICE, 0x100B, 5, 0, 0));

    let events = device.take_events();
    let [AdapterEvent::RawRealtimeReading(r)] = events.as_slice() else {
        panic!("expected one realtime reading, got {:?}", events);
    };
    assert_eq!(r.device_id(), DEVICE);
    assert_eq!(r.reading().stream(), 0x100B);
    assert_eq!(r.reading().value(), 5);
}

// ── Signed reports ───────────────────────────────────────────

#[test]
fn streamed_user_and_system_reports_merge() {
    let (session, clock) = open_session(&StackConfig::default());
    let device = session.channel();

    let user = encode_list_report(
        DEVICE,
        10,
        USER_REPORT_STREAMER,
        300,
        USER_OUTPUTS,
        &[
            Reading::new(0x5001, 11, 100, UNIX_EPOCH, 1),
            Reading::new(0x5001, 33, 200, UNIX_EPOCH, 3),
        ],
    );
    let system = encode_list_report(
        DEVICE,
        12,
        SYSTEM_REPORT_STREAMER,
        310,
        SYSTEM_OUTPUTS,
        &[
            Reading::new(0x5C00, 22, 150, UNIX_EPOCH, 2),
            Reading::new(0x5C00, 44, 250, UNIX_EPOCH, 4),
        ],
    );
    stream(device, &user);
    stream(device, &system);

    let events = device.take_events();
    let reports = robust_reports(&events);
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.validity() == Validity::Valid));

    let merged = ReportMerger::new(clock.clone())
        .merge(&reports[0], &reports[1])
        .unwrap();
    assert_eq!(merged.validity(), Validity::Valid);
    assert_eq!(merged.streamer(), COMBINED_REPORT_STREAMER);
    assert_eq!(merged.header().report_id, 12);
    assert_eq!(merged.header().sent_time, 310);
    let ids: Vec<u32> = merged.readings().iter().map(Reading::id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(merged.reading_id_range(), (1, 4));

    // Merged readings are anchored to the system report's clock.
    let anchor = UNIX_EPOCH + Duration::from_secs(50_000 - 310);
    assert_eq!(merged.readings()[0].time(), anchor + Duration::from_secs(100));
    assert_eq!(merged.readings()[3].time(), anchor + Duration::from_secs(250));
}

#[test]
fn every_started_report_finishes() {
    let (session, _) = open_session(&StackConfig::default());
    let device = session.channel();

    let readings: Vec<Reading> = (1..=20)
        .map(|i| Reading::new(0x5001, i, i, UNIX_EPOCH, i))
        .collect();
    let raw = encode_list_report(DEVICE, 21, USER_REPORT_STREAMER, 40, USER_OUTPUTS, &readings);
    stream(device, &raw);

    let events = device.take_events();
    let started = events
        .iter()
        .filter(|e| matches!(e, AdapterEvent::RobustReportStarted(_)))
        .count();
    let finished = events
        .iter()
        .filter(|e| matches!(e, AdapterEvent::RobustReportFinished(_)))
        .count();
    assert_eq!(started, 1);
    assert_eq!(finished, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, AdapterEvent::RobustReportProgress(_))));
    assert_eq!(robust_reports(&events).len(), 1);
    assert_eq!(session.streaming().reports_received(), 1);
}

#[test]
fn stopping_mid_report_finishes_it_and_ignores_the_rest() {
    let (session, _) = open_session(&StackConfig::default());
    let device = session.channel();

    let readings: Vec<Reading> = (1..=5)
        .map(|i| Reading::new(0x5001, i, i, UNIX_EPOCH, i))
        .collect();
    let raw = encode_list_report(DEVICE, 6, USER_REPORT_STREAMER, 10, USER_OUTPUTS, &readings);
    stream(device, &raw[..40]);
    session.stop_streaming();
    stream(device, &raw[40..]);

    let events = device.take_events();
    assert!(matches!(events[0], AdapterEvent::RobustReportStarted(_)));
    assert_eq!(
        events.last(),
        Some(&AdapterEvent::RobustReportFinished(
            ReportParserEvent::Finished { report_index: 0 }
        ))
    );
    assert!(robust_reports(&events).is_empty());

    // Reopening starts over with a clean decoder.
    session.close().unwrap();
    session.open().unwrap();
    stream(device, &raw);
    assert_eq!(robust_reports(&device.take_events()).len(), 1);
}

#[test]
fn unknown_format_is_reported_once() {
    let (session, _) = open_session(&StackConfig::default());
    let device = session.channel();

    stream(device, &[0x7F; 20]);
    stream(device, &encode_individual_report(DEVICE, 0x100B, 1, 0, 0));

    let events = device.take_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        AdapterEvent::UnrecoverableStreamingError(_)
    ));
}

// ── Stall heartbeat ──────────────────────────────────────────

#[test]
fn heartbeat_reports_stalled_transfer() {
    let config = StackConfig {
        stall_threshold_ms: 10,
        ..StackConfig::default()
    };
    let (session, clock) = open_session(&config);
    let device = session.channel();

    let readings: Vec<Reading> = (1..=10)
        .map(|i| Reading::new(0x5001, i, i, UNIX_EPOCH, i))
        .collect();
    let raw = encode_list_report(DEVICE, 11, USER_REPORT_STREAMER, 10, USER_OUTPUTS, &readings);
    stream(device, &raw[..100]);
    device.take_events();

    clock.advance(Duration::from_secs(5));
    session.run_until(async {
        Timer::after(Duration::from_millis(60)).await;
    });

    let events = device.take_events();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| matches!(
        e,
        AdapterEvent::RobustReportStalled(ReportParserEvent::Stalled {
            percentage: 49,
            report_index: 0
        })
    )));
}
