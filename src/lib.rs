pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod loaders;
pub mod manifest;
pub mod matrix;
pub mod output;
pub mod pickle;
pub mod plot;
pub mod record;
pub mod runner;
pub mod source;
