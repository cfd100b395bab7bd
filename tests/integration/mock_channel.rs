//! Scripted mock device for integration tests.
//!
//! Records every write and answers each RPC command header with the next
//! scripted [`Reply`], delivered synchronously on the response
//! characteristics.  Streaming data is pushed by the test with
//! [`MockDevice::deliver`].

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use iotile_ble::events::AdapterEvent;
use iotile_ble::rpc::{Channel, Characteristic, NotificationHandler, Subscription};

// ── Scripted replies ──────────────────────────────────────────

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Reply {
    /// Header only, with the given status byte.
    Status(u8),
    /// Successful call returning `payload`.
    Data(Vec<u8>),
    /// Arbitrary header and optional payload notification.
    Raw {
        header: Vec<u8>,
        payload: Option<Vec<u8>>,
    },
    /// Never answer.
    Silence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

// ── MockDevice ────────────────────────────────────────────────

#[derive(Default)]
pub struct MockDevice {
    handlers: RefCell<HashMap<Characteristic, (u32, NotificationHandler)>>,
    next_id: Cell<u32>,
    live: Cell<usize>,
    replies: RefCell<VecDeque<Reply>>,
    pub writes: RefCell<Vec<(Characteristic, Vec<u8>)>>,
    pub events: RefCell<Vec<AdapterEvent>>,
    pub fail_writes: Cell<bool>,
}

#[allow(dead_code)]
impl MockDevice {
    pub fn script(&self, reply: Reply) {
        self.replies.borrow_mut().push_back(reply);
    }

    /// Push a notification to whoever is subscribed on `characteristic`.
    pub fn deliver(&self, characteristic: Characteristic, data: &[u8]) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        match handlers.get_mut(&characteristic) {
            Some((_, handler)) => {
                handler(data);
                true
            }
            None => false,
        }
    }

    /// Subscriptions handed out and not yet unsubscribed.
    pub fn live_subscriptions(&self) -> usize {
        self.live.get()
    }

    pub fn is_subscribed(&self, characteristic: Characteristic) -> bool {
        self.handlers.borrow().contains_key(&characteristic)
    }

    /// Command headers written so far, as `(address, rpc_id)`.
    pub fn commands(&self) -> Vec<(u8, u16)> {
        self.writes
            .borrow()
            .iter()
            .filter(|(c, _)| *c == Characteristic::SendHeader)
            .map(|(_, h)| (h[4], u16::from_le_bytes([h[2], h[3]])))
            .collect()
    }

    pub fn take_events(&self) -> Vec<AdapterEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    fn answer(&self, reply: Reply) {
        match reply {
            Reply::Status(status) => {
                self.deliver(Characteristic::ReceiveHeader, &[status, 0, 0, 0]);
            }
            Reply::Data(payload) => {
                self.deliver(
                    Characteristic::ReceiveHeader,
                    &[0xC0, 0, 0, payload.len() as u8],
                );
                self.deliver(Characteristic::ReceivePayload, &payload);
            }
            Reply::Raw { header, payload } => {
                self.deliver(Characteristic::ReceiveHeader, &header);
                if let Some(payload) = payload {
                    self.deliver(Characteristic::ReceivePayload, &payload);
                }
            }
            Reply::Silence => {}
        }
    }
}

impl Channel for MockDevice {
    type Error = MockError;

    async fn write(&self, characteristic: Characteristic, data: &[u8]) -> Result<(), MockError> {
        if self.fail_writes.get() {
            return Err(MockError);
        }
        self.writes
            .borrow_mut()
            .push((characteristic, data.to_vec()));

        if characteristic == Characteristic::SendHeader {
            let reply = self.replies.borrow_mut().pop_front();
            if let Some(reply) = reply {
                self.answer(reply);
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: Characteristic,
        handler: NotificationHandler,
    ) -> Result<Subscription, MockError> {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.live.set(self.live.get() + 1);
        self.handlers
            .borrow_mut()
            .insert(characteristic, (id, handler));
        Ok(Subscription { characteristic, id })
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), MockError> {
        let mut handlers = self.handlers.borrow_mut();
        match handlers.get(&subscription.characteristic) {
            Some((id, _)) if *id == subscription.id => {
                handlers.remove(&subscription.characteristic);
                self.live.set(self.live.get() - 1);
                Ok(())
            }
            _ => Err(MockError),
        }
    }

    fn notify(&self, event: AdapterEvent) {
        self.events.borrow_mut().push(event);
    }
}
