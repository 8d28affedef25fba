//! Human-readable location for a client address, shown in session listings.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;

pub const UNKNOWN_LOCATION: &str = "Unknown";

#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> String;
}

pub struct NoneGeolocation;

#[async_trait]
impl GeolocationProvider for NoneGeolocation {
    async fn locate(&self, _ip: IpAddr) -> String {
        UNKNOWN_LOCATION.to_string()
    }
}

/// Fixed lookup table.
#[derive(Default)]
pub struct MockGeolocation {
    table: HashMap<IpAddr, String>,
}

impl MockGeolocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: IpAddr, location: &str) -> Self {
        self.table.insert(ip, location.to_string());
        self
    }
}

#[async_trait]
impl GeolocationProvider for MockGeolocation {
    async fn locate(&self, ip: IpAddr) -> String {
        self.table
            .get(&ip)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
    }
}
