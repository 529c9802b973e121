pub mod clock;
pub mod config;
pub mod db;
pub mod directory;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod report;
pub mod service;
pub mod store;
pub mod validate;
pub mod views;
