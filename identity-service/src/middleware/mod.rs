pub mod rate_limit;
pub mod session;

pub use rate_limit::{rate_limit_middleware, RateLimitBucket, RateLimitClass, RouteLimiter};
pub use session::{session_middleware, Caller};
