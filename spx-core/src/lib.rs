//! SPX Core - Shared protocol types
//!
//! Types shared between the `spx-launcher` daemon and its CLI clients for
//! communication over the control socket, plus the body served by the SPX
//! server's status endpoint.

mod protocol;
mod status;

pub use protocol::*;
pub use status::*;
