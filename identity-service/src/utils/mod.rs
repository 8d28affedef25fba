pub mod client_ip;
pub mod password;
pub mod tokens;
pub mod validation;

pub use client_ip::{parse_trusted_proxies, ClientIpConfig};
pub use password::{hash_password, verify_password, Password};
pub use tokens::{constant_time_eq, generate_token, is_token_format};
pub use validation::ValidatedJson;
