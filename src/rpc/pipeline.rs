//! Single-outstanding-request RPC pipeline.
//!
//! Callers may invoke RPCs concurrently; the pipeline queues them and
//! runs exactly one command/response exchange at a time, in submission
//! order.
//!
//! ```text
//!                  invoke()
//!                     │
//!                     ▼
//!   ┌───────┐  pop  ┌─────────┐ write payload, header ┌────────────────┐
//!   │ queue │──────▶│ Sending │──────────────────────▶│ AwaitingHeader │
//!   └───────┘       └─────────┘                       └───────┬────────┘
//!       ▲                            error status / no data   │ has data
//!       │ next (spawned)   ┌──────────────────────────────────┤
//!       │                  ▼                                  ▼
//!       │             ┌──────────┐   payload ≥ len   ┌─────────────────┐
//!       └─────────────│ Resolved │◀──────────────────│ AwaitingPayload │
//!                     └──────────┘                   └─────────────────┘
//!
//!   any fatal error (timeout, write failure, bad length, unexpected
//!   notification) ──▶ Stopped: in-flight and queued calls fail, further
//!   calls fail immediately, until open() resets the pipeline.
//! ```
//!
//! Two timeouts exist per call.  The watchdog (fixed, 15 s by default)
//! aborts the whole pipeline if no response header arrives.  The caller's
//! timeout only produces a warning when a call is slower than expected.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use async_io_mini::Timer;
use edge_executor::{LocalExecutor, Task};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, error, warn};

use super::header::{MAX_RPC_PAYLOAD, ResponseHeader, encode_command};
use super::transport::{Channel, Characteristic, Subscription};
use crate::config::StackConfig;
use crate::error::{RpcError, RpcErrorKind};
use crate::events::AdapterEvent;

type Completion = Signal<NoopRawMutex, Result<Vec<u8>, RpcError>>;

struct PendingRpc {
    address: u8,
    rpc_id: u16,
    payload: Vec<u8>,
    timeout: Duration,
    done: Rc<Completion>,
}

impl PendingRpc {
    fn fail(self, kind: RpcErrorKind) {
        self.done
            .signal(Err(RpcError::new(self.address, self.rpc_id, kind)));
    }
}

/// Response phase of the request in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exchange {
    AwaitingHeader,
    AwaitingPayload { expected_len: usize },
}

struct InFlight {
    rpc: PendingRpc,
    exchange: Exchange,
    watchdog: Option<Task<()>>,
    id: u64,
    started: Instant,
}

#[derive(Default)]
struct PipelineState {
    queue: VecDeque<PendingRpc>,
    current: Option<InFlight>,
    processing: bool,
    stopped: bool,
    last_error: Option<RpcErrorKind>,
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// What a response notification does to the request in flight.
enum Outcome {
    Wait,
    Finish(Result<Vec<u8>, RpcError>),
    Fatal(RpcErrorKind),
}

struct Inner<C: Channel + 'static> {
    state: RefCell<PipelineState>,
    channel: Rc<C>,
    executor: Rc<LocalExecutor<'static>>,
    watchdog: Duration,
    default_timeout: Duration,
}

/// Queues RPCs and runs them one at a time over a [`Channel`].
///
/// Cloning yields another handle to the same pipeline.
pub struct RpcPipeline<C: Channel + 'static> {
    inner: Rc<Inner<C>>,
}

impl<C: Channel + 'static> Clone for RpcPipeline<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: Channel + 'static> RpcPipeline<C> {
    pub fn new(
        channel: Rc<C>,
        executor: Rc<LocalExecutor<'static>>,
        watchdog: Duration,
        default_timeout: Duration,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(PipelineState::default()),
                channel,
                executor,
                watchdog,
                default_timeout,
            }),
        }
    }

    pub fn from_config(
        channel: Rc<C>,
        executor: Rc<LocalExecutor<'static>>,
        config: &StackConfig,
    ) -> Self {
        Self::new(
            channel,
            executor,
            config.rpc_watchdog(),
            config.rpc_default_timeout(),
        )
    }

    /// Reset all state and subscribe to the response characteristics.
    ///
    /// Reopening an open pipeline drops the earlier subscriptions first,
    /// so each response characteristic has exactly one handler.
    pub async fn open(&self) -> Result<(), C::Error> {
        self.reset(RpcErrorKind::StoppedFromPreviousErrors);

        let stale = std::mem::take(&mut self.inner.state.borrow_mut().subscriptions);
        for sub in stale {
            self.inner.channel.unsubscribe(sub).await?;
        }

        let weak = Rc::downgrade(&self.inner);
        let header = self
            .inner
            .channel
            .subscribe(
                Characteristic::ReceiveHeader,
                Box::new(move |data| {
                    if let Some(inner) = weak.upgrade() {
                        Inner::on_header(&inner, data);
                    }
                }),
            )
            .await?;

        let weak = Rc::downgrade(&self.inner);
        let payload = self
            .inner
            .channel
            .subscribe(
                Characteristic::ReceivePayload,
                Box::new(move |data| {
                    if let Some(inner) = weak.upgrade() {
                        Inner::on_payload(&inner, data);
                    }
                }),
            )
            .await;
        let payload = match payload {
            Ok(sub) => sub,
            Err(e) => {
                // Do not leave a half-open pipeline behind.
                let _ = self.inner.channel.unsubscribe(header).await;
                return Err(e);
            }
        };

        self.inner.state.borrow_mut().subscriptions = vec![header, payload];
        debug!("RPC: pipeline open");
        Ok(())
    }

    /// Unsubscribe and stop.  Calls still pending fail.
    pub async fn close(&self) -> Result<(), C::Error> {
        let subscriptions = {
            let mut st = self.inner.state.borrow_mut();
            std::mem::take(&mut st.subscriptions)
        };
        self.reset(RpcErrorKind::StoppedFromPreviousErrors);
        self.inner.state.borrow_mut().stopped = true;

        let mut result = Ok(());
        for sub in subscriptions {
            if let Err(e) = self.inner.channel.unsubscribe(sub).await {
                warn!("RPC: unsubscribe from {:?} failed: {:?}", sub.characteristic, e);
                result = Err(e);
            }
        }
        debug!("RPC: pipeline closed");
        result
    }

    /// Fail everything pending with `kind` and clear the stopped state.
    fn reset(&self, kind: RpcErrorKind) {
        let (current, queued) = {
            let mut st = self.inner.state.borrow_mut();
            let current = st.current.take();
            let queued: Vec<PendingRpc> = st.queue.drain(..).collect();
            st.processing = false;
            st.stopped = false;
            st.last_error = None;
            (current, queued)
        };

        if let Some(flight) = current {
            drop(flight.watchdog);
            flight.rpc.fail(kind);
        }
        for rpc in queued {
            rpc.fail(kind);
        }
    }

    /// Queue an RPC to tile `address`.
    ///
    /// The call is queued before this returns, so the order of `invoke`
    /// calls is the order on the wire.  `timeout` (default 1 s) only
    /// controls the slow-call warning; the watchdog decides when a call
    /// has failed.
    pub fn invoke(
        &self,
        address: u8,
        rpc_id: u16,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<Vec<u8>, RpcError>> + 'static {
        let done = Rc::new(Completion::new());
        let rpc = PendingRpc {
            address,
            rpc_id,
            payload: payload.to_vec(),
            timeout: timeout.unwrap_or(self.inner.default_timeout),
            done: Rc::clone(&done),
        };

        if let Err(kind) = self.enqueue(rpc) {
            done.signal(Err(RpcError::new(address, rpc_id, kind)));
        }

        async move { done.wait().await }
    }

    fn enqueue(&self, rpc: PendingRpc) -> Result<(), RpcErrorKind> {
        {
            let mut st = self.inner.state.borrow_mut();
            if st.stopped {
                return Err(RpcErrorKind::StoppedFromPreviousErrors);
            }
            if rpc.payload.len() > MAX_RPC_PAYLOAD {
                return Err(RpcErrorKind::PayloadTooLarge(rpc.payload.len()));
            }
            st.queue.push_back(rpc);
        }
        Inner::schedule(&self.inner);
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.state.borrow().stopped
    }

    /// The error that stopped the pipeline, if any.
    pub fn last_error(&self) -> Option<RpcErrorKind> {
        self.inner.state.borrow().last_error
    }

    /// Calls waiting behind the one in flight.
    pub fn queued(&self) -> usize {
        self.inner.state.borrow().queue.len()
    }

    pub fn in_flight(&self) -> bool {
        self.inner.state.borrow().current.is_some()
    }
}

impl<C: Channel + 'static> Inner<C> {
    /// Spawn a task for the head of the queue unless one is already
    /// running.  Resuming through the executor keeps a long queue from
    /// recursing.
    fn schedule(this: &Rc<Self>) {
        {
            let mut st = this.state.borrow_mut();
            if st.processing || st.stopped || st.queue.is_empty() {
                return;
            }
            st.processing = true;
        }

        let weak = Rc::downgrade(this);
        this.executor
            .spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    Self::process_one(inner).await;
                }
            })
            .detach();
    }

    async fn process_one(this: Rc<Self>) {
        let (id, address, rpc_id, payload) = {
            let mut st = this.state.borrow_mut();
            if st.stopped {
                st.processing = false;
                return;
            }
            let Some(rpc) = st.queue.pop_front() else {
                st.processing = false;
                return;
            };

            let id = st.next_id;
            st.next_id += 1;
            let fields = (id, rpc.address, rpc.rpc_id, rpc.payload.clone());
            st.current = Some(InFlight {
                rpc,
                exchange: Exchange::AwaitingHeader,
                watchdog: Some(Self::arm_watchdog(&this, id)),
                id,
                started: Instant::now(),
            });
            fields
        };

        debug!(
            "RPC: sending 0x{:04x} to tile {} ({} byte payload)",
            rpc_id,
            address,
            payload.len()
        );

        if !payload.is_empty() {
            if let Err(e) = this
                .channel
                .write(Characteristic::SendPayload, &payload)
                .await
            {
                Self::write_failed(&this, id, &e);
                return;
            }
            if !this.is_current(id) {
                return;
            }
        }

        let header = encode_command(address, rpc_id, payload.len() as u8);
        if let Err(e) = this.channel.write(Characteristic::SendHeader, &header).await {
            Self::write_failed(&this, id, &e);
        }
    }

    fn arm_watchdog(this: &Rc<Self>, id: u64) -> Task<()> {
        let weak: Weak<Self> = Rc::downgrade(this);
        let limit = this.watchdog;
        this.executor.spawn(async move {
            Timer::after(limit).await;
            if let Some(inner) = weak.upgrade() {
                if inner.is_current(id) {
                    Self::fatal_error(&inner, RpcErrorKind::UnexpectedTimeout, true);
                }
            }
        })
    }

    fn is_current(&self, id: u64) -> bool {
        self.state
            .borrow()
            .current
            .as_ref()
            .is_some_and(|f| f.id == id)
    }

    fn write_failed(this: &Rc<Self>, id: u64, e: &C::Error) {
        warn!("RPC: write failed: {:?}", e);
        if this.is_current(id) {
            Self::fatal_error(this, RpcErrorKind::WriteFailure, false);
        }
    }

    fn on_header(this: &Rc<Self>, data: &[u8]) {
        let outcome = {
            let mut st = this.state.borrow_mut();
            if st.stopped {
                return;
            }
            match st.current.as_mut() {
                None => Outcome::Fatal(RpcErrorKind::ResponseAtInvalidTime),
                Some(flight) if flight.exchange != Exchange::AwaitingHeader => {
                    Outcome::Fatal(RpcErrorKind::ResponseAtInvalidTime)
                }
                Some(flight) => match ResponseHeader::parse(data) {
                    Err(kind) => Outcome::Fatal(kind),
                    Ok(header) if !header.is_success() => Outcome::Finish(Err(RpcError::new(
                        flight.rpc.address,
                        flight.rpc.rpc_id,
                        RpcErrorKind::Status(header.status),
                    ))),
                    Ok(header) if !header.has_data() => Outcome::Finish(Ok(Vec::new())),
                    Ok(header) => {
                        flight.exchange = Exchange::AwaitingPayload {
                            expected_len: usize::from(header.payload_len),
                        };
                        Outcome::Wait
                    }
                },
            }
        };
        Self::apply(this, outcome);
    }

    fn on_payload(this: &Rc<Self>, data: &[u8]) {
        let outcome = {
            let st = this.state.borrow();
            if st.stopped {
                return;
            }
            match st.current.as_ref().map(|f| f.exchange) {
                Some(Exchange::AwaitingPayload { expected_len }) => {
                    if data.len() < expected_len {
                        Outcome::Fatal(RpcErrorKind::IncorrectLength)
                    } else {
                        Outcome::Finish(Ok(data[..expected_len].to_vec()))
                    }
                }
                _ => Outcome::Fatal(RpcErrorKind::ResponseAtInvalidTime),
            }
        };
        Self::apply(this, outcome);
    }

    fn apply(this: &Rc<Self>, outcome: Outcome) {
        match outcome {
            Outcome::Wait => {}
            Outcome::Finish(result) => Self::finish(this, result),
            Outcome::Fatal(kind) => Self::fatal_error(this, kind, false),
        }
    }

    fn finish(this: &Rc<Self>, result: Result<Vec<u8>, RpcError>) {
        let flight = {
            let mut st = this.state.borrow_mut();
            st.processing = false;
            st.current.take()
        };

        if let Some(flight) = flight {
            // Dropping the task handle cancels the watchdog.
            drop(flight.watchdog);

            let elapsed = flight.started.elapsed();
            if elapsed > flight.rpc.timeout {
                warn!(
                    "RPC: 0x{:04x} on tile {} took {:?}, expected at most {:?}",
                    flight.rpc.rpc_id, flight.rpc.address, elapsed, flight.rpc.timeout
                );
            }
            flight.rpc.done.signal(result);
        }

        Self::schedule(this);
    }

    fn fatal_error(this: &Rc<Self>, kind: RpcErrorKind, from_watchdog: bool) {
        let (current, queued) = {
            let mut st = this.state.borrow_mut();
            if st.stopped {
                return;
            }
            st.stopped = true;
            st.processing = false;
            st.last_error = Some(kind);
            let queued: Vec<PendingRpc> = st.queue.drain(..).collect();
            (st.current.take(), queued)
        };

        error!("RPC: pipeline stopped: {}", kind);

        if let Some(flight) = current {
            match flight.watchdog {
                // The watchdog is the task running this code.
                Some(task) if from_watchdog => task.detach(),
                other => drop(other),
            }
            flight.rpc.fail(kind);
        }
        for rpc in queued {
            rpc.fail(RpcErrorKind::StoppedFromPreviousErrors);
        }

        this.channel
            .notify(AdapterEvent::UnrecoverableRpcError(RpcError::new(0, 0, kind)));
    }
}

// ── Tests ────────────────────────────────────────────────────
