use super::{AnyComponentStorage, ComponentStorage, Entity};
use std::any::TypeId;
use std::collections::HashMap;

struct Registered {
    name: String,
    storage: Box<dyn AnyComponentStorage>,
}

/// Storages for component types that are not built into the scene.
///
/// Types are keyed by `TypeId` and carry a stable string name so external
/// callers (scripts) can address them without knowing the Rust type.
#[derive(Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, Registered>,
    by_name: HashMap<String, TypeId>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `C` under `name`. A type that is already registered keeps
    /// its storage and is rebound to the new name. Returns false when the
    /// name is held by a different type or nothing changed.
    pub fn register<C: 'static>(&mut self, name: &str) -> bool {
        let type_id = TypeId::of::<C>();
        if let Some(&owner) = self.by_name.get(name) {
            if owner != type_id {
                log::warn!("Component name '{}' is already taken by another type", name);
            }
            return false;
        }
        if let Some(registered) = self.by_type.get_mut(&type_id) {
            self.by_name.remove(&registered.name);
            log::debug!("Renamed component type '{}' to '{}'", registered.name, name);
            registered.name = name.to_owned();
            self.by_name.insert(name.to_owned(), type_id);
            return true;
        }
        self.by_name.insert(name.to_owned(), type_id);
        self.by_type.insert(
            type_id,
            Registered {
                name: name.to_owned(),
                storage: Box::new(ComponentStorage::<C>::new()),
            },
        );
        log::debug!("Registered component type '{}'", name);
        true
    }

    pub fn is_registered<C: 'static>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<C>())
    }

    pub fn type_of(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of<C: 'static>(&self) -> Option<&str> {
        self.by_type.get(&TypeId::of::<C>()).map(|r| r.name.as_str())
    }

    pub fn storage<C: 'static>(&self) -> Option<&ComponentStorage<C>> {
        self.by_type
            .get(&TypeId::of::<C>())?
            .storage
            .as_any()
            .downcast_ref()
    }

    pub fn storage_mut<C: 'static>(&mut self) -> Option<&mut ComponentStorage<C>> {
        self.by_type
            .get_mut(&TypeId::of::<C>())?
            .storage
            .as_any_mut()
            .downcast_mut()
    }

    /// Storage for `C`, registering it under its Rust type name on first use.
    pub fn storage_or_register<C: 'static>(&mut self) -> Option<&mut ComponentStorage<C>> {
        if !self.is_registered::<C>() {
            self.register::<C>(std::any::type_name::<C>());
        }
        self.storage_mut::<C>()
    }

    pub fn erased_by_name(&self, name: &str) -> Option<&dyn AnyComponentStorage> {
        let type_id = self.by_name.get(name)?;
        self.by_type.get(type_id).map(|r| r.storage.as_ref())
    }

    pub fn erased_by_name_mut(&mut self, name: &str) -> Option<&mut dyn AnyComponentStorage> {
        let type_id = self.by_name.get(name)?;
        self.by_type.get_mut(type_id).map(|r| r.storage.as_mut())
    }

    pub fn remove_entity(&mut self, entity: Entity) {
        for registered in self.by_type.values_mut() {
            registered.storage.remove_entity(entity);
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        for registered in self.by_type.values_mut() {
            registered.storage.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(i32);

    #[derive(Debug, PartialEq)]
    struct Mana(i32);

    #[test]
    fn register_and_lookup_by_name() {
        let mut registry = ComponentRegistry::new();
        assert!(registry.register::<Health>("Health"));
        assert!(!registry.register::<Health>("Health"));
        assert_eq!(registry.type_of("Health"), Some(TypeId::of::<Health>()));
        assert_eq!(registry.name_of::<Health>(), Some("Health"));

        let e = Entity::new(0, 0);
        registry.storage_mut::<Health>().unwrap().insert(e, Health(5)).unwrap();
        assert!(registry.erased_by_name("Health").unwrap().contains_entity(e));

        registry.remove_entity(e);
        assert!(registry.storage::<Health>().unwrap().is_empty());
    }

    #[test]
    fn registering_after_first_use_renames_and_keeps_data() {
        let mut registry = ComponentRegistry::new();
        let e = Entity::new(3, 0);
        registry.storage_or_register::<Health>().unwrap().insert(e, Health(7)).unwrap();
        let auto_name = std::any::type_name::<Health>();
        assert_eq!(registry.name_of::<Health>(), Some(auto_name));

        assert!(registry.register::<Health>("Health"));
        assert_eq!(registry.name_of::<Health>(), Some("Health"));
        assert_eq!(registry.type_of("Health"), Some(TypeId::of::<Health>()));
        assert_eq!(registry.type_of(auto_name), None);
        assert!(registry.erased_by_name("Health").unwrap().contains_entity(e));
        assert_eq!(registry.storage::<Health>().unwrap().get(e), Some(&Health(7)));
    }

    #[test]
    fn name_held_by_another_type_is_rejected() {
        let mut registry = ComponentRegistry::new();
        assert!(registry.register::<Health>("Stat"));
        assert!(!registry.register::<Mana>("Stat"));
        assert_eq!(registry.type_of("Stat"), Some(TypeId::of::<Health>()));
        assert!(!registry.is_registered::<Mana>());

        assert!(registry.register::<Mana>("Mana"));
        assert!(!registry.register::<Mana>("Stat"));
        assert_eq!(registry.name_of::<Mana>(), Some("Mana"));
        assert_eq!(registry.names().count(), 2);
    }
}
