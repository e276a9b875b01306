//! Producer and consumer built on the broker transport.

mod consumer;
mod producer;

pub use consumer::{BrokerConsumer, ConsumerSettings, QueueBinding};
pub use producer::BrokerProducer;
