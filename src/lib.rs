//! Terminal stock explorer: fetch daily history from Yahoo Finance, chart or
//! tabulate it, and keep copies in a local SQLite file.

pub mod app;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod store;
pub mod ui;
pub mod view;
