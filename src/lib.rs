#![warn(rust_2018_idioms, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub(crate) mod api;
pub mod app;
pub mod classification;
pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod observability;
pub mod schema;
pub mod service;
pub mod store;
pub mod training;

pub use error::{DetectorError, ErrorKind, Result};
pub use service::{DetectorService, ModelSnapshot, ModelStatus};
