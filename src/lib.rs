pub mod data;
pub mod error;
pub mod logger;
pub mod mapping;
pub mod utils;
