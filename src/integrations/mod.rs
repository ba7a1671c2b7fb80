//! Collaborators the daemon talks to: id generation, local probes, and the
//! server connection.

pub mod identity;
pub mod probe;
pub mod transport;
