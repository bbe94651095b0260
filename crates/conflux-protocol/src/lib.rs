//! Wire types shared between `conflux-gateway` and `conflux-bus`: the
//! WebSocket frame envelope, the handshake payloads, well-known method
//! names, and the domain event envelope published on the topic exchange.

pub mod frames;
pub mod handshake;
pub mod methods;
