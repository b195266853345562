pub mod cancel;
pub mod conf;
pub mod error;
