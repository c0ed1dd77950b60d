pub mod app;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod firecloud;
pub mod fs_util;
pub mod gcs;
pub mod http;
pub mod job;
pub mod listing;
pub mod output;
pub mod pool;
pub mod store;
pub mod tdr;
pub mod tsv;
