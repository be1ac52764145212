//! The request path: forwarding, routing, and the front-end listener.

pub mod forwarder;
pub mod router;
pub mod server;

pub use forwarder::{Forwarder, UpstreamFailure};
pub use router::RequestRouter;
pub use server::ProxyServer;
