#![doc = include_str!("../README.md")]

#[cfg(not(target_os = "linux"))]
compile_error!("ldm only supports Linux");

pub mod config;
pub mod control;
pub mod device;
pub mod engine;
pub mod error;
pub mod hook;
pub mod lifecycle;
pub mod mount_driver;
pub mod mountpoint;
pub mod quirks;
pub mod registry;
pub mod resolver;
pub mod singleton;
pub mod table;

pub use config::{Config, HookConfig, Paths, REGISTRY_CAPACITY};
pub use engine::Engine;
pub use error::{LdmError, Result};
