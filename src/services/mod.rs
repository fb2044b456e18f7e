pub mod error;
pub mod facebook;
pub mod instagram;
pub mod refresh;
pub mod twitter;
