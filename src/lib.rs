pub mod app;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod layout;
pub mod libraries;
pub mod output;
pub mod reconcile;
pub mod samplesheet;
pub mod shutdown;
pub mod store;
