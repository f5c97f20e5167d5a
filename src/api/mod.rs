pub mod handlers;
pub mod params;

pub use handlers::{create_api_router, ApiState};
