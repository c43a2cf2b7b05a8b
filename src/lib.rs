pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod shared;

pub use shared::config::AppConfig;
pub use shared::error::{AppError, Result};
