pub mod client;
pub mod config;
pub mod error;
pub mod files;
pub mod mutation;
pub mod navigation;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod view;

#[cfg(test)]
mod testing;
