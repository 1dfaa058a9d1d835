#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod image;
pub mod instance;
pub mod logging;
pub mod naming;
pub mod paths;
pub mod progress;
pub mod provision;
pub mod remove;
pub mod util;
