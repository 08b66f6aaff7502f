//! IPC subsystem: named ports with queued messages, and byte pipes
//! (`spec.md` §4.4).

pub mod msg;
pub mod pipe;
pub mod port;

pub use msg::Message;
pub use pipe::{Pipe, PipeState, PipeTable};
pub use port::{Port, PortState, PortTable};
