//! Native API transport, plaintext or noise-encrypted

pub mod client;
pub mod frame;
pub mod messages;
pub mod noise;
