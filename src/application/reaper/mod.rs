pub mod config;
pub mod worker;

pub use config::ReaperConfig;
pub use worker::{Reaper, ReaperReport};
