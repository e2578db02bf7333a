use std::fmt;

/// TCP address of a controller socket.
///
/// Lane endpoints sit on the intersection network, so only `tcp://` is
/// supported. A host of `0.0.0.0` binds every interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    pub host: String,
    pub port: u16,
}

impl Transport {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `tcp://host:port` endpoint from configuration.
    ///
    /// Returns `None` for other schemes, a missing host, or a bad port.
    pub fn parse(endpoint: &str) -> Option<Self> {
        let addr = endpoint.strip_prefix("tcp://")?;
        let (host, port) = addr.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        Some(Self::tcp(host, port.parse().ok()?))
    }

    /// ZeroMQ endpoint string.
    pub fn endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.endpoint())
    }
}
