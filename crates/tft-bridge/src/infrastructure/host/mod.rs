//! Host control API adapters.
//!
//! - [`api_client`]: `ApiClient`, the rate-limited, retrying HTTP client
//! - [`supervisor`]: `ConnectionSupervisor` for the WebSocket push channel
//! - [`endpoints`]: the fixed endpoint set
//! - [`mock`]: in-memory `MockHost` for tests

pub mod api_client;
pub mod endpoints;
pub mod mock;
pub mod supervisor;

pub use api_client::ApiClient;
pub use supervisor::ConnectionSupervisor;
