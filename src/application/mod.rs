pub mod builder;
pub mod dto;
pub mod locks;
pub mod ports;
pub mod reaper;
pub mod use_cases;
