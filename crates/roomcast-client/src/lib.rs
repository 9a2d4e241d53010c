//! Roomcast client.
//!
//! Connects to a relay over QUIC, joins one room, sends opaque messages and
//! receives deliveries from the other members. Heartbeat probes from the
//! server are answered automatically unless disabled in [`ClientOptions`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), roomcast_client::TransportError> {
//! let addr = "127.0.0.1:4433".parse().unwrap();
//! let mut client = roomcast_client::RoomClient::join(addr, "alice", "lobby").await?;
//! client.send(&b"hello"[..]).await?;
//! let delivery = client.next_delivery().await?;
//! println!("{}: {:?}", delivery.sender, delivery.content);
//! client.leave("done").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod client;
mod transport;

pub use client::{ClientEvent, ClientOptions, RoomClient};
pub use roomcast_proto::payloads::{ErrorPayload, relay::Delivery};
pub use transport::TransportError;
