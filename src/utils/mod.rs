pub mod config;
pub mod pdf;
