#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod deps;
pub mod error;
pub mod installer;
pub mod logging;
pub mod package;
pub mod platform;
pub mod provenance;
pub mod python_link;
pub mod resolver;
pub mod staging;
pub mod uninstaller;
pub mod utils;
pub mod version;
