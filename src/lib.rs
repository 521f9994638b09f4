pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod feedback;
pub mod imdb;
pub mod kmeans;
mod metrics;
pub mod ranker;
pub mod server;
pub mod store;
pub mod utils;

pub use config::Opts;
pub use error::{CbirError, Result};
pub use imdb::{IMDB, IMDBBuilder};
