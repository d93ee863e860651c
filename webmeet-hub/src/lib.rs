//! Connection hub for WebMeet
//!
//! One serialized event loop owns every connected peer and every room's
//! membership. Peers talk to it through a cloneable [`HubHandle`]; the loop
//! never blocks on a peer or on the media relay.
//!
//! - **`message`**: the JSON wire envelope and its typed form
//! - **`hub`**: the registry actor
//! - **`dispatcher`**: per-room FIFO workers in front of the `SignalingHandler`
//! - **`peer`**: reader and writer pumps for one transport connection

mod dispatcher;
pub mod hub;
pub mod message;
pub mod peer;

pub use hub::{spawn, DirectMessage, Hub, HubError, HubHandle, PeerHandle, RoomMessage, Target};
pub use message::{Envelope, Message, MessageType, Payload, ProtocolError};
pub use peer::{serve, Frame, FrameReader, FrameWriter, PeerOptions, TransportError};
