pub mod config;
pub mod level;
pub mod types;
