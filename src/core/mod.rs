pub mod clean;
pub mod config;
pub mod error;
pub mod fetch;
pub mod input;
pub mod pipeline;
pub mod report;
pub mod structure;
pub mod tool;
pub mod utils;
