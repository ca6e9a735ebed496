//! Combat log processing for World of Warcraft.
//!
//! Lines are tokenized, turned into typed events and fed to two segmenters:
//! [`segmenter::EncounterSegmenter`] cuts the stream into fights, and
//! [`enhanced::EnhancedSegmenter`] builds raid pulls and keystone runs with
//! per-character event streams. [`pipeline::run_file`] does a whole file
//! in one pass; [`parallel::run_file_parallel`] splits it first.

pub mod categorizer;
pub mod character;
pub mod combat_periods;
pub mod config;
pub mod enhanced;
pub mod error;
pub mod events;
pub mod models;
pub mod parallel;
pub mod parser;
pub mod pipeline;
pub mod segmenter;
pub mod tokenizer;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use events::{CombatEvent, EventRef};
pub use parallel::run_file_parallel;
pub use pipeline::{run_file, run_reader, CombatLogPipeline, PipelineOutput};
