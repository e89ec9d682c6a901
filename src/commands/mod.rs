// Command handlers module
pub mod completions;
pub mod config;
pub mod courses;
pub mod download;
pub mod login;
pub mod materials;
pub mod session;
