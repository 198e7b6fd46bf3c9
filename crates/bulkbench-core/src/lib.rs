pub mod cluster;
pub mod config;
pub mod error;
pub mod fanout;
pub mod lifecycle;
pub mod results;
pub mod runner;
pub mod scenario;
pub mod sql;
pub mod types;
pub mod uri;
