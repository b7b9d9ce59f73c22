pub mod time;

pub use time::{format_seconds, parse_time, try_parse_time, INVALID_TIME};
