pub mod arbiter;
pub mod bootstrap;
pub mod config;
pub mod generation;
pub mod handler;
pub mod normalizer;
pub mod outbound;
pub mod sessions;
