pub mod config;
pub mod error;
pub mod job;
pub mod matcher;
pub mod note;
pub mod processor;
pub mod query;
pub mod settings;
pub mod store;
pub mod stores;
pub mod sync;
pub mod tagger;
pub mod walker;
pub mod web_server;
