//! Roomcast coordination core.
//!
//! Owns room membership and fans messages out to room members. The transport
//! is abstract: a connection is a [`FrameReader`] and a [`FrameWriter`], and
//! everything else in this crate is independent of how bytes reach clients.
//!
//! # Architecture
//!
//! ```text
//!  ConnectionSupervisor ─┐
//!  ConnectionSupervisor ─┼──(bounded queue of Event)──> Coordinator ──> ClientHandle::deliver
//!  ConnectionSupervisor ─┘                               owns RoomDirectory
//! ```
//!
//! The [`Coordinator`] is the only writer of the [`RoomDirectory`]. Every
//! register, unregister and broadcast goes through its queue and is applied to
//! completion before the next one starts, so membership needs no lock.
//!
//! # Components
//!
//! - [`ClientHandle`]: identity plus a [`ClientChannel`] to one connection
//! - [`Room`] / [`RoomDirectory`]: membership, with empty rooms removed eagerly
//! - [`Event`]: register, unregister, broadcast
//! - [`Coordinator`] / [`CoordinatorHandle`]: the serialization point
//! - [`ConnectionSupervisor`]: reader and heartbeat tasks for one connection

#![forbid(unsafe_code)]

mod channel;
pub mod config;
mod coordinator;
mod directory;
pub mod env;
mod error;
mod event;
mod handle;
mod room;
mod supervisor;

pub use channel::{ClientChannel, Outbound, OutboundQueue, QueuedChannel, queued_channel};
pub use config::RelayConfig;
pub use coordinator::{Coordinator, CoordinatorHandle, Outcome};
pub use directory::{DirectorySnapshot, FanOut, JoinResult, LeaveResult, RoomDirectory};
pub use env::Environment;
pub use error::{CoordinatorError, DeliveryError, ReadError, WriteError};
pub use event::{Broadcast, Event, SYSTEM_SENDER, Sender, welcome_message};
pub use handle::ClientHandle;
pub use room::Room;
pub use supervisor::{ConnectionSupervisor, Disconnect, FrameReader, FrameWriter, Inbound};
