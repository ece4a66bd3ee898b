pub mod config;
pub mod database_ops;
pub mod measurements;
pub mod normalization;
pub mod telemetry;

pub mod util {
    pub mod env;
}

pub use config::AppConfig;
