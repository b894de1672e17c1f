pub mod ai_provider;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod logging;
