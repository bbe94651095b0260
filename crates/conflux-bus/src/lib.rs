pub mod bridge;
pub mod error;
pub mod manager;
pub mod noop_publisher;
pub mod outbox;
pub mod publisher;
pub mod redis_publisher;
pub mod types;

pub use bridge::{BridgeConsumer, ChannelSink};
pub use error::BusError;
pub use manager::BusManager;
pub use noop_publisher::NoopPublisher;
pub use outbox::OutboxStore;
pub use publisher::Publisher;
pub use redis_publisher::{RedisChannelPublisher, RedisPublisher};
pub use types::{BusStatus, OutboxEntry, SweepReport};
