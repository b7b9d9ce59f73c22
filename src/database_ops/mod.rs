pub mod db;
pub mod error;
pub mod fastdl;
pub mod http;
pub mod lazy_fill;
pub mod maps;
pub mod reconcile;
pub mod servers;
pub mod sourcejump;
pub mod tas_sheet;
pub mod worker_manager;
