pub mod app;
pub mod config;
pub mod domain;
pub mod elastic;
pub mod emitter;
pub mod error;
pub mod fs_util;
pub mod history;
pub mod interactions;
pub mod lookup;
pub mod output;
pub mod pathways;
pub mod resolver;
pub mod stage;
pub mod store;
pub mod tables;
