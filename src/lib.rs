pub mod config;
pub mod directive;
pub mod engine;
pub mod logging;
pub mod report;
pub mod version;
