pub mod data;
pub mod io;

pub use data::{Config, ExternalServer};
pub use io::ConfigError;

#[cfg(test)]
mod tests;
