//! Application layer: the bridge's use cases.
//!
//! Everything here is transport-agnostic.  Sockets are hidden behind the
//! [`session::SessionTransport`] and [`device::DeviceSource`] traits and are
//! provided by the infrastructure layer.

pub mod broadcast;
pub mod device;
pub mod dispatcher;
pub mod handler;
pub mod registry;
pub mod session;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use device::{DeviceError, DeviceSource, DeviceState, RunOutcome};
pub use dispatcher::{dispatch_channel, DispatchHandle, DispatchLoop};
pub use handler::{canned_test_shot, Handled, SessionHandler};
pub use registry::{RegistryError, SubscriberRegistry};
pub use session::{Session, SessionId, SessionState, SessionTransport, TransportError};
