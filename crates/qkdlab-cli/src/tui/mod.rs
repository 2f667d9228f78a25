//! Live terminal dashboard for a continuous BB84 run.

pub mod app;
pub mod ui;
