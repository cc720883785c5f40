pub mod error;
pub mod message;
pub mod messages;
pub mod metrics;
pub mod pubsub;
pub mod transport;

pub use error::TransportError;
pub use message::Message;
pub use messages::events;
pub use messages::topics;
pub use metrics::MetricsCollector;
pub use pubsub::ZmqPubSub;
pub use transport::Transport;
