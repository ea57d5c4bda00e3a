//! Adapters behind the domain ports: storage, the emulated card network,
//! risk signal sources and the PAN codec.

pub mod codec;
pub mod emulator;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod signals;
