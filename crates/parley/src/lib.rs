pub mod adapter;
pub mod agent;
pub mod config;
pub mod errors;
pub mod models;
pub mod providers;
pub mod publisher;
pub mod store;
pub mod stream;
pub mod tools;

pub use agent::{ProcessRequest, SessionController};
