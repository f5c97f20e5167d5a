pub mod handler;
pub mod server;
pub mod subscriber;

pub use server::run_listener;
