pub mod analyzer;
pub mod config;
pub mod loader;
pub mod model;
pub mod orchestrator;
pub mod storage;
pub mod utils;
