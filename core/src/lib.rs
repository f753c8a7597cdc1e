pub mod action;
pub mod config;
pub mod digest;
pub mod impairment;
pub mod process;
pub mod sanity;
pub mod store;
pub mod style;
pub mod testing;
pub mod transfer;

pub use crate::config::Config;
