// src/config/mod.rs
pub mod pipeline;

pub use pipeline::{load_pipeline_config_default, load_pipeline_config_from, PipelineConfig};
