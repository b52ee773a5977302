//! wardenctl library - exposes modules for testing

pub mod cli;
pub mod commands;
pub mod confirm;
pub mod errors;
pub mod logging;
pub mod output;
