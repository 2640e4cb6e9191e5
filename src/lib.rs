//! claimdash: terminal dashboard for monthly insurance claims extracts

pub mod cli;
pub mod config;
pub mod logging;
pub mod services;
pub mod tui;
pub mod types;
