pub mod cache;
pub mod config;
pub mod error;
pub mod job;
pub mod media;
pub mod pipeline;
pub mod queue;
pub mod render;
pub mod script;
pub mod speech;
pub mod sync;
pub mod utils;
