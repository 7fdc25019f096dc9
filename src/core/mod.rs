//! Core building blocks shared by every subsystem

pub mod handles;

pub use handles::{Handle, SlotResource, Storage, StorageError, StorageResult};
