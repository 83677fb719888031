pub mod backend;
mod cli;
pub mod db;
pub mod flow;
pub mod graph;
pub mod icons;
pub mod models;
pub mod settings;
pub mod utils;

pub use cli::run;
