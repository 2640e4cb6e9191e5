//! TUI widgets

pub mod chart;
pub mod filter_bar;
pub mod help;
pub mod summary;
pub mod tabs;
