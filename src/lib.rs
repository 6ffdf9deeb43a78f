pub mod aggregate;
pub mod artifacts;
pub mod audit;
pub mod config;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod report;
pub mod stage;
pub mod subtyper_config;
pub mod ui;
