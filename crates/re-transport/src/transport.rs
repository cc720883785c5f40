use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Socket directory for IPC transports. Every rule worker and the
/// relay engine itself bind under the same namespace so a local
/// deployment never has to coordinate paths by hand.
const IPC_SOCKET_DIR: &str = "/tmp/rules-engine";

/// Where a [`crate::pubsub::ZmqPubSub`] binds or connects.
///
/// Config carries these as plain strings (`tcp://host:port` or
/// `ipc://name`) — [`Transport::from_endpoint`] parses that shape back
/// into a [`Transport`]; [`Transport::endpoint`] is its inverse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket under [`IPC_SOCKET_DIR`]. Fastest option when
    /// the broker and its workers share a host.
    Ipc(String),

    /// TCP transport for a broker reachable over the network.
    Tcp { host: String, port: u16 },
}

impl Transport {
    /// Create an IPC transport with the given socket name.
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_string())
    }

    /// Create a TCP transport with the given host and port.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse a `tcp://host:port` or `ipc://name` endpoint string, the
    /// shape `BrokerConfig.frontend`/`.backend` are stored in. Anything
    /// that isn't a well-formed `tcp://` address falls back to IPC,
    /// treating the string (minus an `ipc://` prefix, if present) as
    /// the socket name.
    pub fn from_endpoint(endpoint: &str) -> Self {
        if let Some(rest) = endpoint.strip_prefix("tcp://") {
            if let Some((host, port)) = rest.rsplit_once(':') {
                if let Ok(port) = port.parse() {
                    return Self::tcp(host, port);
                }
            }
        }
        let name = endpoint.strip_prefix("ipc://").unwrap_or(endpoint);
        Self::ipc(name)
    }

    /// Generate the ZeroMQ endpoint address string.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(name) => format!("ipc://{IPC_SOCKET_DIR}/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }
}

impl FromStr for Transport {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_endpoint(s))
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_endpoint() {
        let t = Transport::ipc("broker");
        assert_eq!(t.endpoint(), "ipc:///tmp/rules-engine/broker.sock");
    }

    #[test]
    fn tcp_endpoint() {
        let t = Transport::tcp("127.0.0.1", 5555);
        assert_eq!(t.endpoint(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn display_matches_endpoint() {
        let t = Transport::tcp("localhost", 9090);
        assert_eq!(t.to_string(), t.endpoint());
    }

    #[test]
    fn from_endpoint_parses_tcp() {
        assert_eq!(Transport::from_endpoint("tcp://10.0.0.1:5555"), Transport::tcp("10.0.0.1", 5555));
    }

    #[test]
    fn from_endpoint_parses_ipc_prefix() {
        assert_eq!(Transport::from_endpoint("ipc://broker"), Transport::ipc("broker"));
    }

    #[test]
    fn from_endpoint_falls_back_to_ipc_name() {
        assert_eq!(Transport::from_endpoint("broker"), Transport::ipc("broker"));
    }

    #[test]
    fn from_endpoint_falls_back_on_malformed_tcp() {
        assert_eq!(Transport::from_endpoint("tcp://no-port"), Transport::ipc("tcp://no-port"));
    }
}
