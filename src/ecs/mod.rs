//! Entity allocation and sparse-set component storage

mod component_storage;
mod entity;
mod registry;

pub use component_storage::{AnyComponentStorage, ComponentStorage};
pub use entity::{Entity, EntityManager};
pub use registry::ComponentRegistry;
