pub mod config;
pub mod entity;
pub mod error;

pub use config::ResolverConfig;
pub use entity::*;
pub use error::*;
