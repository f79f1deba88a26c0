pub mod auth;
pub mod cancel;
pub mod chat;
pub mod commands;
pub mod config;
mod expiry;
pub mod goals;
pub mod http;
pub mod journal;
pub mod loading;
pub mod profile;
pub mod runtime;
pub mod timestamp;
