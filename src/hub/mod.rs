//! Outbound side of the bridge: commands sent to the IR hub.

pub mod client;
pub mod command;
pub mod transport;

pub use client::{HTTP_TIMEOUT, IrHubClient};
pub use command::TasmotaCommand;
pub use transport::{CommandPublisher, HttpResponse, HttpTransport, ReqwestTransport};
