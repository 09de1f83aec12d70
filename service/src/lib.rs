// Log analyzer service
// Upload sessions over HTTP, live stream ingestion, and record export,
// built on the `log_parser` crate.

pub mod export;
pub mod models;
pub mod routes;
pub mod session;
pub mod settings;
pub mod stream;

pub use routes::{create_routes, AppState};
pub use settings::Settings;
pub use stream::{StreamService, StreamingConfig};
