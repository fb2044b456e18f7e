pub mod credentials;
pub mod posts;
pub mod rate_limits;
