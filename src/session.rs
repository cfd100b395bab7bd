//! Session — one open link to one device.
//!
//! Owns everything the core needs for a connection: the channel, the
//! cooperative executor that drives RPC processing and timers, the RPC
//! pipeline and the streaming interface.  Nothing here is global; drop
//! the session and the state goes with it.
//!
//! ```text
//! ┌──────────────────────── Session ────────────────────────┐
//! │  LocalExecutor ─┬─ RPC process task (one at a time)     │
//! │                 ├─ RPC watchdog timer                   │
//! │                 └─ streaming stall heartbeat            │
//! │                                                         │
//! │  RpcPipeline ───────┐                                   │
//! │  StreamingInterface ┴──▶ Channel (write/subscribe/notify)│
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use async_io_mini::Timer;
use edge_executor::{LocalExecutor, Task};
use log::info;

use crate::adapters::time::{Clock, SystemClock};
use crate::config::StackConfig;
use crate::error::{Error, RpcError};
use crate::rpc::{Channel, RpcPipeline};
use crate::stream::StreamingInterface;

pub struct Session<C: Channel + 'static, K: Clock + 'static = SystemClock> {
    channel: Rc<C>,
    executor: Rc<LocalExecutor<'static>>,
    rpc: RpcPipeline<C>,
    streaming: StreamingInterface<C, K>,
    stall_poll: Duration,
    heartbeat: RefCell<Option<Task<()>>>,
}

impl<C: Channel + 'static> Session<C, SystemClock> {
    pub fn new(channel: C, config: &StackConfig) -> Result<Self, Error> {
        Self::with_clock(channel, config, SystemClock)
    }
}

impl<C: Channel + 'static, K: Clock + 'static> Session<C, K> {
    pub fn with_clock(channel: C, config: &StackConfig, clock: K) -> Result<Self, Error> {
        config.validate()?;

        let channel = Rc::new(channel);
        let executor = Rc::new(LocalExecutor::new());
        let rpc = RpcPipeline::from_config(Rc::clone(&channel), Rc::clone(&executor), config);
        let streaming = StreamingInterface::new(Rc::clone(&channel), config, clock);

        Ok(Self {
            channel,
            executor,
            rpc,
            streaming,
            stall_poll: config.stall_threshold(),
            heartbeat: RefCell::new(None),
        })
    }

    /// Subscribe both interfaces and start the stall heartbeat.
    ///
    /// Drives the executor until the subscriptions are in place.
    pub fn open(&self) -> Result<(), C::Error> {
        let rpc = self.rpc.clone();
        let streaming = self.streaming.clone();
        self.run_until(async move {
            rpc.open().await?;
            if let Err(e) = streaming.open().await {
                let _ = rpc.close().await;
                return Err(e);
            }
            Ok(())
        })?;

        let streaming = self.streaming.clone();
        let period = self.stall_poll;
        let heartbeat = self.executor.spawn(async move {
            loop {
                Timer::after(period).await;
                streaming.poll_events();
            }
        });
        *self.heartbeat.borrow_mut() = Some(heartbeat);

        info!("SESSION: open");
        Ok(())
    }

    /// Unsubscribe everything.  Pending RPCs fail.
    pub fn close(&self) -> Result<(), C::Error> {
        drop(self.heartbeat.borrow_mut().take());
        let rpc = self.rpc.clone();
        let streaming = self.streaming.clone();
        let result = self.run_until(async move {
            let streaming = streaming.close().await;
            let rpc = rpc.close().await;
            streaming.and(rpc)
        });
        info!("SESSION: closed");
        result
    }

    pub fn is_open(&self) -> bool {
        self.heartbeat.borrow().is_some()
    }

    /// Queue an RPC; see [`RpcPipeline::invoke`].
    pub fn rpc(
        &self,
        address: u8,
        rpc_id: u16,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<Vec<u8>, RpcError>> + 'static {
        self.rpc.invoke(address, rpc_id, payload, timeout)
    }

    /// Stop decoding the report stream until the session is reopened.
    pub fn stop_streaming(&self) {
        self.streaming.stop();
    }

    /// Drive the session's tasks until `fut` completes.
    pub fn run_until<F: Future + 'static>(&self, fut: F) -> F::Output {
        futures_lite::future::block_on(self.executor.run(fut))
    }

    pub fn channel(&self) -> &Rc<C> {
        &self.channel
    }

    pub fn executor(&self) -> &Rc<LocalExecutor<'static>> {
        &self.executor
    }

    pub fn rpc_pipeline(&self) -> &RpcPipeline<C> {
        &self.rpc
    }

    pub fn streaming(&self) -> &StreamingInterface<C, K> {
        &self.streaming
    }
}
