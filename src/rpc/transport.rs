//! Channel abstraction — the notification-based link to one device.
//!
//! Concrete implementations:
//! - a BLE GATT connection (write + notify characteristics)
//! - a replay channel fed from a capture file
//! - scripted mocks in tests
//!
//! The RPC pipeline and the streaming interface are generic over
//! `Channel`, so adding a new link requires zero changes to either.

use crate::events::AdapterEvent;

/// The five characteristics the core uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Host → device RPC command header.
    SendHeader,
    /// Device → host RPC response header.
    ReceiveHeader,
    /// Host → device RPC command payload.
    SendPayload,
    /// Device → host RPC response payload.
    ReceivePayload,
    /// Device → host report stream.
    Streaming,
}

/// Callback invoked with each notification on a subscribed characteristic.
pub type NotificationHandler = Box<dyn FnMut(&[u8])>;

/// Handle returned by [`Channel::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub characteristic: Characteristic,
    pub id: u32,
}

/// Notification-based link to a device.
///
/// Handlers registered with `subscribe` are called synchronously, one
/// notification at a time; they must not call back into the channel.
#[allow(async_fn_in_trait)]
pub trait Channel {
    /// Error type for this channel.
    type Error: core::fmt::Debug + 'static;

    /// Write `data` to a host → device characteristic.
    async fn write(&self, characteristic: Characteristic, data: &[u8]) -> Result<(), Self::Error>;

    /// Start delivering notifications on `characteristic` to `handler`.
    async fn subscribe(
        &self,
        characteristic: Characteristic,
        handler: NotificationHandler,
    ) -> Result<Subscription, Self::Error>;

    /// Stop a subscription.
    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), Self::Error>;

    /// Publish an event to the layers above the core.
    fn notify(&self, event: AdapterEvent);
}
