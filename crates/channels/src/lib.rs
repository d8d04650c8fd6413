//! Outbound channel delivery for Talon.
//!
//! Only the send path lives here: the runtime's services hand a session key
//! and a message to the [`DirectSender`], which dispatches to the right
//! platform HTTP API. Receiving (webhooks, long polling) is the host
//! application's concern.

pub mod direct;

pub use direct::{DirectSender, build_sender};
