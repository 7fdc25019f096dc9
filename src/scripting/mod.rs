//! Binding surface for script hosts
//!
//! Scripts address components by their registered names. Every call goes
//! through the scene's own storages; nothing is cached on this side.

use crate::core::StorageError;
use crate::ecs::Entity;
use crate::scene::Scene;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Entity {0} is not alive")]
    DeadEntity(Entity),
    #[error("Unknown component type '{0}'")]
    UnknownComponent(String),
    #[error("Entity {entity} has no {component} component")]
    MissingComponent { entity: Entity, component: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ScriptResult<T> = Result<T, ScriptError>;

pub struct ScriptApi<'a> {
    scene: &'a mut Scene,
}

impl<'a> ScriptApi<'a> {
    pub fn new(scene: &'a mut Scene) -> Self {
        Self { scene }
    }

    pub fn scene(&self) -> &Scene {
        &*self.scene
    }

    pub fn create_entity(&mut self) -> ScriptResult<Entity> {
        Ok(self.scene.create_entity()?)
    }

    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        self.scene.destroy_entity(entity)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.scene.is_alive(entity)
    }

    /// Make `C` addressable from scripts as `name`
    pub fn register_component<C: 'static>(&mut self, name: &str) -> bool {
        self.scene.register_component::<C>(name)
    }

    pub fn component_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.scene.registry().names().collect();
        names.sort_unstable();
        names
    }

    pub fn add_component<C: 'static>(&mut self, entity: Entity, component: C) -> ScriptResult<()> {
        if self.scene.add_component(entity, component)? {
            Ok(())
        } else {
            Err(ScriptError::DeadEntity(entity))
        }
    }

    /// False for unknown names as well as entities lacking the component
    pub fn has_component(&self, entity: Entity, name: &str) -> bool {
        self.scene
            .registry()
            .erased_by_name(name)
            .is_some_and(|storage| storage.contains_entity(entity))
    }

    pub fn get_component<C: 'static>(&self, entity: Entity) -> Option<&C> {
        self.scene.get_component::<C>(entity)
    }

    /// Run `f` on the entity's `C` in place
    pub fn update_component<C: 'static, R>(
        &mut self,
        entity: Entity,
        f: impl FnOnce(&mut C) -> R,
    ) -> ScriptResult<R> {
        if !self.scene.is_alive(entity) {
            return Err(ScriptError::DeadEntity(entity));
        }
        let component = self.scene.get_component_mut::<C>(entity).ok_or_else(|| {
            ScriptError::MissingComponent {
                entity,
                component: std::any::type_name::<C>().to_string(),
            }
        })?;
        Ok(f(component))
    }

    pub fn remove_component(&mut self, entity: Entity, name: &str) -> bool {
        self.scene.remove_component_named(entity, name)
    }

    /// Entities that have every named component, in the dense order of the
    /// smallest matching storage. An empty list matches every live entity.
    pub fn query(&self, names: &[&str]) -> ScriptResult<Vec<Entity>> {
        if names.is_empty() {
            return Ok(self.scene.entities().collect());
        }
        let registry = self.scene.registry();
        let mut storages = Vec::with_capacity(names.len());
        for name in names {
            let storage = registry
                .erased_by_name(name)
                .ok_or_else(|| ScriptError::UnknownComponent(name.to_string()))?;
            storages.push(storage);
        }
        let Some(smallest) = storages.iter().min_by_key(|s| s.len()) else {
            return Ok(Vec::new());
        };
        Ok(smallest
            .entities()
            .iter()
            .copied()
            .filter(|e| storages.iter().all(|s| s.contains_entity(*e)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Name, Transform};
    use glam::Vec3;

    #[derive(Debug, Clone, PartialEq)]
    struct Health(i32);

    #[test]
    fn components_by_name() {
        let mut scene = Scene::new();
        let mut api = ScriptApi::new(&mut scene);
        api.register_component::<Health>("Health");
        let e = api.create_entity().unwrap();
        api.add_component(e, Health(10)).unwrap();

        assert!(api.has_component(e, "Health"));
        assert!(!api.has_component(e, "Transform"));
        assert!(!api.has_component(e, "Mana"));

        let hp = api.update_component::<Health, _>(e, |h| {
            h.0 -= 3;
            h.0
        });
        assert_eq!(hp.unwrap(), 7);
        assert_eq!(api.get_component::<Health>(e), Some(&Health(7)));

        assert!(api.remove_component(e, "Health"));
        assert!(!api.has_component(e, "Health"));
        assert!(matches!(
            api.update_component::<Health, _>(e, |_| ()),
            Err(ScriptError::MissingComponent { .. })
        ));
    }

    #[test]
    fn naming_a_type_after_first_use() {
        let mut scene = Scene::new();
        let mut api = ScriptApi::new(&mut scene);
        let e = api.create_entity().unwrap();
        api.add_component(e, Health(4)).unwrap();
        assert!(!api.has_component(e, "Health"));

        assert!(api.register_component::<Health>("Health"));
        assert!(api.has_component(e, "Health"));
        assert_eq!(api.query(&["Health"]).unwrap(), vec![e]);
        assert!(!api.component_names().contains(&std::any::type_name::<Health>()));
    }

    #[test]
    fn query_intersects_storages() {
        let mut scene = Scene::new();
        let mut api = ScriptApi::new(&mut scene);
        let mut named = Vec::new();
        for i in 0..4 {
            let e = api.create_entity().unwrap();
            api.add_component(e, Transform::from_translation(Vec3::splat(i as f32))).unwrap();
            if i % 2 == 1 {
                api.add_component(e, Name::new(format!("odd{}", i))).unwrap();
                named.push(e);
            }
        }

        assert_eq!(api.query(&["Transform", "Name"]).unwrap(), named);
        assert_eq!(api.query(&["Transform"]).unwrap().len(), 4);
        assert!(matches!(api.query(&["Mana"]), Err(ScriptError::UnknownComponent(_))));
    }

    #[test]
    fn dead_entities_are_rejected() {
        let mut scene = Scene::new();
        let mut api = ScriptApi::new(&mut scene);
        let e = api.create_entity().unwrap();
        assert!(api.destroy_entity(e));
        assert!(!api.is_alive(e));
        assert!(matches!(api.add_component(e, Health(1)), Err(ScriptError::DeadEntity(_))));
    }
}
