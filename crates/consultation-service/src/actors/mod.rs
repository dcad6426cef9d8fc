//! Session Registry actors.
//!
//! ```text
//! RegistryActor (single dispatcher, owns every Room)
//! └── ConnectionActor (one per socket handle, owns the write half)
//! ```
//!
//! Callers talk to the dispatcher through [`RegistryHandle`]; commands are
//! processed one at a time in arrival order.

pub mod connection;
pub mod messages;
pub mod metrics;
pub mod registry;

pub use connection::{ConnectionHandle, FrameSink, SinkError, WsSink};
pub use messages::{
    DropReason, JoinTicket, JoinToken, ParticipantInfo, RegistryStatus, RoomSnapshot,
};
pub use metrics::{ActorType, MailboxLevel, MailboxMonitor};
pub use registry::RegistryHandle;
