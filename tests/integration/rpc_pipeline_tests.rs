//! Integration tests for the RPC pipeline running inside a `Session`.
//!
//! The mock device answers each command header with the next scripted
//! reply, so these cover the whole header → payload exchange and the
//! fatal-error drain without any timers firing.

use std::time::Duration;

use async_io_mini::Timer;

use crate::mock_channel::{MockDevice, Reply};

use iotile_ble::error::{RpcError, RpcErrorKind};
use iotile_ble::events::AdapterEvent;
use iotile_ble::rpc::Characteristic;
use iotile_ble::{Session, StackConfig};

fn open_session() -> Session<MockDevice> {
    let session = Session::new(MockDevice::default(), &StackConfig::default()).unwrap();
    session.open().unwrap();
    session
}

// ── Ordering ─────────────────────────────────────────────────

#[test]
fn calls_complete_in_submission_order() {
    let session = open_session();
    let device = session.channel();
    device.script(Reply::Data(vec![1]));
    device.script(Reply::Data(vec![2, 2]));
    device.script(Reply::Data(vec![3, 3, 3]));

    let a = session.rpc(8, 0x0001, &[], None);
    let b = session.rpc(9, 0x0002, &[0xAA], None);
    let c = session.rpc(10, 0x0003, &[], None);
    assert_eq!(session.rpc_pipeline().queued(), 3);
    assert!(!session.rpc_pipeline().in_flight());

    let (a, b, c) = session.run_until(async move { (a.await, b.await, c.await) });
    assert_eq!(a, Ok(vec![1]));
    assert_eq!(b, Ok(vec![2, 2]));
    assert_eq!(c, Ok(vec![3, 3, 3]));

    assert_eq!(device.commands(), vec![(8, 1), (9, 2), (10, 3)]);
    assert!(!session.rpc_pipeline().is_stopped());
}

#[test]
fn payload_is_written_before_header() {
    let session = open_session();
    let device = session.channel();
    device.script(Reply::Status(0x40));

    let call = session.rpc(11, 0x8000, &[1, 2, 3], None);
    assert_eq!(session.run_until(call), Ok(Vec::new()));

    let writes = device.writes.borrow();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], (Characteristic::SendPayload, vec![1, 2, 3]));
    assert_eq!(
        writes[1],
        (Characteristic::SendHeader, vec![3, 0, 0x00, 0x80, 11])
    );
}

// ── Response handling ────────────────────────────────────────

#[test]
fn error_status_fails_only_that_call() {
    let session = open_session();
    let device = session.channel();
    device.script(Reply::Status(0x42));
    device.script(Reply::Status(0x40));

    let failing = session.rpc(8, 0x0010, &[], None);
    let next = session.rpc(8, 0x0011, &[], None);
    let (failing, next) = session.run_until(async move { (failing.await, next.await) });

    assert_eq!(
        failing,
        Err(RpcError::new(8, 0x0010, RpcErrorKind::Status(0x42)))
    );
    assert_eq!(next, Ok(Vec::new()));
    assert!(!session.rpc_pipeline().is_stopped());
    assert!(device.take_events().is_empty());
}

#[test]
fn longer_payload_is_trimmed_to_declared_length() {
    let session = open_session();
    session.channel().script(Reply::Raw {
        header: vec![0xC0, 0, 0, 2],
        payload: Some(vec![9, 8, 7, 6]),
    });

    let call = session.rpc(8, 1, &[], None);
    assert_eq!(session.run_until(call), Ok(vec![9, 8]));
}

#[test]
fn truncated_payload_stops_pipeline() {
    let session = open_session();
    let device = session.channel();
    device.script(Reply::Raw {
        header: vec![0xC0, 0, 0, 6],
        payload: Some(vec![1, 2, 3]),
    });

    let call = session.rpc(8, 0x0020, &[], None);
    assert_eq!(
        session.run_until(call),
        Err(RpcError::new(8, 0x0020, RpcErrorKind::IncorrectLength))
    );
    assert!(session.rpc_pipeline().is_stopped());
    assert_eq!(
        session.rpc_pipeline().last_error(),
        Some(RpcErrorKind::IncorrectLength)
    );
    assert_eq!(
        device.take_events(),
        vec![AdapterEvent::UnrecoverableRpcError(RpcError::new(
            0,
            0,
            RpcErrorKind::IncorrectLength
        ))]
    );

    // Nothing goes out until the session is reopened.
    let later = session.rpc(8, 0x0021, &[], None);
    assert_eq!(
        session.run_until(later).unwrap_err().kind,
        RpcErrorKind::StoppedFromPreviousErrors
    );
    assert_eq!(device.commands().len(), 1);
}

#[test]
fn fatal_error_drains_queued_calls() {
    let session = open_session();
    session.channel().script(Reply::Raw {
        header: vec![0xC0, 0],
        payload: None,
    });

    let first = session.rpc(8, 1, &[], None);
    let second = session.rpc(8, 2, &[], None);
    let third = session.rpc(8, 3, &[], None);
    let results = session.run_until(async move { (first.await, second.await, third.await) });

    assert_eq!(results.0.unwrap_err().kind, RpcErrorKind::IncorrectLength);
    assert_eq!(
        results.1.unwrap_err().kind,
        RpcErrorKind::StoppedFromPreviousErrors
    );
    assert_eq!(
        results.2.unwrap_err().kind,
        RpcErrorKind::StoppedFromPreviousErrors
    );
    assert_eq!(session.channel().commands(), vec![(8, 1)]);
}

#[test]
fn unsolicited_payload_is_fatal() {
    let session = open_session();
    let device = session.channel();

    assert!(device.deliver(Characteristic::ReceivePayload, &[1, 2]));
    assert!(session.rpc_pipeline().is_stopped());
    assert_eq!(
        session.rpc_pipeline().last_error(),
        Some(RpcErrorKind::ResponseAtInvalidTime)
    );
    assert_eq!(device.take_events().len(), 1);
}

#[test]
fn second_header_while_awaiting_payload_is_fatal() {
    let session = open_session();
    session.channel().script(Reply::Silence);

    let call = session.rpc(8, 5, &[], None);
    let device = std::rc::Rc::clone(session.channel());
    let result = session.run_until(async move {
        while device.commands().is_empty() {
            futures_lite::future::yield_now().await;
        }
        device.deliver(Characteristic::ReceiveHeader, &[0xC0, 0, 0, 4]);
        device.deliver(Characteristic::ReceiveHeader, &[0xC0, 0, 0, 4]);
        call.await
    });

    assert_eq!(
        result,
        Err(RpcError::new(8, 5, RpcErrorKind::ResponseAtInvalidTime))
    );
}

#[test]
fn slow_reply_only_warns() {
    let session = open_session();
    session.channel().script(Reply::Silence);

    // The caller's timeout is far below the watchdog; overrunning it
    // must not fail the call or stop the pipeline.
    let call = session.rpc(8, 6, &[], Some(Duration::from_millis(1)));
    let device = std::rc::Rc::clone(session.channel());
    let result = session.run_until(async move {
        while device.commands().is_empty() {
            futures_lite::future::yield_now().await;
        }
        Timer::after(Duration::from_millis(20)).await;
        device.deliver(Characteristic::ReceiveHeader, &[0x40, 0, 0, 0]);
        call.await
    });

    assert_eq!(result, Ok(Vec::new()));
    assert!(!session.rpc_pipeline().is_stopped());
    assert!(session.channel().take_events().is_empty());

    session.channel().script(Reply::Data(vec![0x11, 0x22]));
    let next = session.rpc(8, 7, &[], Some(Duration::from_millis(1)));
    assert_eq!(session.run_until(next), Ok(vec![0x11, 0x22]));
    assert_eq!(session.channel().commands(), vec![(8, 6), (8, 7)]);
}

#[test]
fn write_failure_is_fatal() {
    let session = open_session();
    session.channel().fail_writes.set(true);

    let call = session.rpc(8, 0x0030, &[7], None);
    assert_eq!(
        session.run_until(call),
        Err(RpcError::new(8, 0x0030, RpcErrorKind::WriteFailure))
    );
    assert!(session.rpc_pipeline().is_stopped());
}

// ── Session lifecycle ────────────────────────────────────────

#[test]
fn reopening_clears_stopped_state() {
    let session = open_session();
    let device = session.channel();
    assert!(device.deliver(Characteristic::ReceivePayload, &[0]));
    assert!(session.rpc_pipeline().is_stopped());

    session.close().unwrap();
    assert!(!device.is_subscribed(Characteristic::ReceiveHeader));
    assert!(!device.is_subscribed(Characteristic::Streaming));
    assert!(!session.is_open());

    session.open().unwrap();
    assert!(!session.rpc_pipeline().is_stopped());
    assert_eq!(session.rpc_pipeline().last_error(), None);

    device.script(Reply::Data(vec![0x55]));
    let call = session.rpc(8, 1, &[], None);
    assert_eq!(session.run_until(call), Ok(vec![0x55]));
}

#[test]
fn opening_twice_keeps_one_subscription_each() {
    let session = open_session();
    let device = session.channel();
    assert_eq!(device.live_subscriptions(), 3);

    session.open().unwrap();
    assert_eq!(device.live_subscriptions(), 3);

    device.script(Reply::Data(vec![0x42]));
    let call = session.rpc(8, 1, &[], None);
    assert_eq!(session.run_until(call), Ok(vec![0x42]));

    session.close().unwrap();
    assert_eq!(device.live_subscriptions(), 0);
}

#[test]
fn close_fails_pending_calls() {
    let session = open_session();
    session.channel().script(Reply::Silence);

    let call = session.rpc(8, 1, &[], None);
    // Send the command, then hang up before the device answers.
    let pipeline = session.rpc_pipeline().clone();
    session.run_until(async move {
        while pipeline.queued() > 0 || !pipeline.in_flight() {
            futures_lite::future::yield_now().await;
        }
    });
    assert_eq!(session.channel().commands(), vec![(8, 1)]);

    session.close().unwrap();
    let result = futures_lite::future::block_on(call);
    assert_eq!(
        result.unwrap_err().kind,
        RpcErrorKind::StoppedFromPreviousErrors
    );
}

#[test]
fn invalid_config_is_rejected() {
    let config = StackConfig {
        rpc_watchdog_secs: 0,
        ..StackConfig::default()
    };
    assert!(Session::new(MockDevice::default(), &config).is_err());
}
