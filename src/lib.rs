// This file makes items available to main.rs and integration tests.

pub mod annotation;
pub mod cli;
pub mod commands;
pub mod context;
pub mod database;
pub mod db_types;
pub mod diff;
pub mod distance;
pub mod errors;
pub mod kmer;
pub mod logging;
pub mod pipeline;
pub mod prevalence;
pub mod sketch;
pub mod tools;
pub mod utils;
