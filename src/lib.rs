pub mod app;
pub mod backend;
pub mod branch;
pub mod cli;
pub mod config;
pub mod models;
pub mod store;
pub mod stream;
