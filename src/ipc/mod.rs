//! Preview request wire format — record schema and codec.

pub mod codec;
pub mod protocol;
