pub mod app;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod model_registry;
pub mod synth;
pub mod upstream;
