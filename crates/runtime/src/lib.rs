//! Signed transport for the pi control-plane API.
//!
//! Two kinds of calls go through a [`Connection`]:
//!
//! * [`Connection::request`]: an ordinary signed request/response, used for
//!   pod lookup, exec create/start/inspect and resize.
//! * [`Connection::hijack`]: sends a signed request on a dedicated socket,
//!   consumes only the response head and hands the raw socket back as a
//!   [`HijackedConnection`] for byte-level streaming.
//!
//! Every request is signed by [`Signer`] and, when `TRACE` logging is on for
//! the `pi.transport` target, dumped as an equivalent `curl` command line.

pub mod connection;
mod curl;
pub mod endpoint;
pub mod error;
pub mod hijack;
pub mod signer;
mod tls;

pub use connection::{Connection, ConnectionConfig, RawResponse};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use hijack::{HijackReader, HijackWriter, HijackedConnection, RawStream};
pub use signer::{Credentials, Signer};
