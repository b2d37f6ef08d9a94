//! The two interception points around the transport
//!
//! `request` decorates outgoing requests with credentials; `response`
//! decides what to do with a rejected response. The client wires them
//! together and performs the side effects each decision calls for.

pub mod request;
pub mod response;

pub use request::RequestGate;
pub use response::{Decision, TOKEN_NOT_VALID, classify};
