mod http_layers;
pub mod metrics;
pub mod server;
pub mod state;
mod trigger_routes;

pub use http_layers::log_requests;
pub use server::{make_app, run_server};
pub use state::ServerState;
pub use trigger_routes::{HealthResponse, SchedulerInfoResponse};
