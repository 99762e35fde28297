pub mod config;
pub mod detect;
pub mod doctor;
pub mod env;
pub mod envfile;
pub mod error;
pub mod git;
pub mod hooks;
pub mod io;
pub mod lifecycle;
pub mod paths;
pub mod ports;
pub mod runner;
pub mod scaffold;
pub mod services;

pub use error::{Result, WtError};
