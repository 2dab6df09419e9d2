pub mod app;
pub mod config;
pub mod direct;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod gdrive;
pub mod layout;
pub mod mapping;
pub mod output;
pub mod progress;
