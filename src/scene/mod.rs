//! Scene: entities, components and the transform hierarchy
//!
//! Every component type lives in its own sparse-set storage inside a
//! [`ComponentRegistry`]. The builtin render components are registered when
//! the scene is created; any other `'static` type is registered on first use
//! or explicitly through [`Scene::register_component`].
//!
//! Parent links are weak back-references. Destroying a parent orphans its
//! children: they become roots and keep their current world placement,
//! including descendants reached through children that have no Transform.

mod camera;
mod light;
mod mesh_renderer;
mod transform;

pub use camera::{view_matrix_from_world, Camera};
pub use light::{DirectionalLight, GpuLightData, Light, LightKind, LIGHT_TYPE_POINT, LIGHT_TYPE_SPOT};
pub use mesh_renderer::{MeshRenderer, Name};
pub use transform::Transform;

use crate::animation::Animator;
use crate::core::StorageResult;
use crate::ecs::{ComponentRegistry, ComponentStorage, Entity, EntityManager};
use crate::resources::Resources;
use glam::Mat4;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("Entity {0} is not alive")]
    DeadEntity(Entity),
    #[error("Entity {0} cannot be its own parent")]
    SelfParent(Entity),
    #[error("Parenting {child} under {parent} would create a cycle")]
    Cycle { child: Entity, parent: Entity },
}

pub struct Scene {
    entities: EntityManager,
    components: ComponentRegistry,
    parents: HashMap<Entity, Entity>,
    children: HashMap<Entity, Vec<Entity>>,
    active_camera: Option<Entity>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut components = ComponentRegistry::new();
        components.register::<Transform>("Transform");
        components.register::<Camera>("Camera");
        components.register::<Light>("Light");
        components.register::<MeshRenderer>("MeshRenderer");
        components.register::<Name>("Name");
        components.register::<Animator>("Animator");

        Self {
            entities: EntityManager::new(),
            components,
            parents: HashMap::new(),
            children: HashMap::new(),
            active_camera: None,
        }
    }

    // ---- Entities ----

    pub fn create_entity(&mut self) -> StorageResult<Entity> {
        self.entities.create()
    }

    pub fn create_named(&mut self, name: &str) -> StorageResult<Entity> {
        let entity = self.entities.create()?;
        if let Err(err) = self.add_component(entity, Name::new(name)) {
            self.entities.destroy(entity);
            return Err(err);
        }
        Ok(entity)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter_alive()
    }

    /// Remove `entity` from every storage and from the hierarchy.
    ///
    /// Children are orphaned. Their local transforms are rewritten to their
    /// current world transforms so they stay where they were. A child without
    /// a Transform has the rewrite applied to its nearest descendants that
    /// carry one.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }

        let mut placed = Vec::new();
        for &child in self.children_of(entity) {
            self.collect_placed(child, &mut placed);
        }
        let baked: Vec<(Entity, Mat4)> = placed
            .into_iter()
            .map(|e| (e, self.compute_world_matrix(e)))
            .collect();

        let children = self.children.remove(&entity).unwrap_or_default();
        for child in children {
            self.parents.remove(&child);
        }
        for (e, world) in baked {
            if let Some(transform) = self.get_component_mut::<Transform>(e) {
                *transform = Transform::from_matrix(world);
            }
        }
        self.detach(entity);

        self.components.remove_entity(entity);
        if self.active_camera == Some(entity) {
            self.active_camera = None;
        }
        self.entities.destroy(entity);
        log::trace!("Destroyed {}", entity);
        true
    }

    /// Destroy every entity and reset the hierarchy.
    pub fn clear(&mut self) {
        self.components.clear();
        self.entities.clear();
        self.parents.clear();
        self.children.clear();
        self.active_camera = None;
    }

    pub fn find_by_name(&self, name: &str) -> Option<Entity> {
        self.storage::<Name>()?
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(e, _)| e)
    }

    // ---- Components ----

    /// Register a component type under a script-visible name.
    pub fn register_component<C: 'static>(&mut self, name: &str) -> bool {
        self.components.register::<C>(name)
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Add or replace a component. Returns `Ok(false)` for dead entities.
    pub fn add_component<C: 'static>(&mut self, entity: Entity, component: C) -> StorageResult<bool> {
        if !self.entities.is_alive(entity) {
            return Ok(false);
        }
        match self.components.storage_or_register::<C>() {
            Some(storage) => {
                storage.insert(entity, component)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get_component<C: 'static>(&self, entity: Entity) -> Option<&C> {
        self.storage::<C>()?.get(entity)
    }

    pub fn get_component_mut<C: 'static>(&mut self, entity: Entity) -> Option<&mut C> {
        self.components.storage_mut::<C>()?.get_mut(entity)
    }

    pub fn has_component<C: 'static>(&self, entity: Entity) -> bool {
        self.storage::<C>().is_some_and(|s| s.contains(entity))
    }

    pub fn remove_component<C: 'static>(&mut self, entity: Entity) -> Option<C> {
        self.components.storage_mut::<C>()?.remove(entity)
    }

    /// Remove the component registered under `name`. False when the name is
    /// unknown or the entity lacks it.
    pub fn remove_component_named(&mut self, entity: Entity, name: &str) -> bool {
        self.components
            .erased_by_name_mut(name)
            .is_some_and(|storage| storage.remove_entity(entity))
    }

    pub fn storage<C: 'static>(&self) -> Option<&ComponentStorage<C>> {
        self.components.storage::<C>()
    }

    pub fn storage_mut<C: 'static>(&mut self) -> Option<&mut ComponentStorage<C>> {
        self.components.storage_mut::<C>()
    }

    // ---- Hierarchy ----

    pub fn set_parent(&mut self, child: Entity, parent: Entity) -> Result<(), HierarchyError> {
        if !self.entities.is_alive(child) {
            return Err(HierarchyError::DeadEntity(child));
        }
        if !self.entities.is_alive(parent) {
            return Err(HierarchyError::DeadEntity(parent));
        }
        if child == parent {
            return Err(HierarchyError::SelfParent(child));
        }

        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == child {
                return Err(HierarchyError::Cycle { child, parent });
            }
            ancestor = self.parents.get(&current).copied();
        }

        self.detach(child);
        self.parents.insert(child, parent);
        self.children.entry(parent).or_default().push(child);
        Ok(())
    }

    /// Make `child` a root. Returns false if it had no parent.
    pub fn remove_parent(&mut self, child: Entity) -> bool {
        self.detach(child)
    }

    /// `entity` if it has a Transform, otherwise its closest descendants
    /// that do.
    fn collect_placed(&self, entity: Entity, out: &mut Vec<Entity>) {
        if self.has_component::<Transform>(entity) {
            out.push(entity);
            return;
        }
        for &child in self.children_of(entity) {
            self.collect_placed(child, out);
        }
    }

    fn detach(&mut self, child: Entity) -> bool {
        let Some(parent) = self.parents.remove(&child) else {
            return false;
        };
        if let Some(siblings) = self.children.get_mut(&parent) {
            siblings.retain(|c| *c != child);
            if siblings.is_empty() {
                self.children.remove(&parent);
            }
        }
        true
    }

    pub fn parent_of(&self, entity: Entity) -> Option<Entity> {
        self.parents.get(&entity).copied()
    }

    pub fn children_of(&self, entity: Entity) -> &[Entity] {
        self.children.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Live entities without a parent, in index order.
    pub fn roots(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities
            .iter_alive()
            .filter(|e| !self.parents.contains_key(e))
    }

    /// World matrix computed from the local transforms up the parent chain,
    /// independent of the cached value.
    pub fn compute_world_matrix(&self, entity: Entity) -> Mat4 {
        let mut world = Mat4::IDENTITY;
        let mut current = Some(entity);
        while let Some(e) = current {
            if let Some(t) = self.get_component::<Transform>(e) {
                world = t.local_matrix() * world;
            }
            current = self.parents.get(&e).copied();
        }
        world
    }

    /// Recompute every cached world matrix, parents strictly before their
    /// children. Entities without a Transform pass their parent's world
    /// matrix through to their descendants.
    pub fn update_world_transforms(&mut self) {
        let roots: Vec<Entity> = self.roots().collect();
        let Some(transforms) = self.components.storage_mut::<Transform>() else {
            return;
        };
        let children = &self.children;

        let mut stack: Vec<(Entity, Mat4)> = Vec::new();
        for root in roots {
            stack.push((root, Mat4::IDENTITY));
            while let Some((entity, parent_world)) = stack.pop() {
                let world = match transforms.get_mut(entity) {
                    Some(t) => {
                        let world = parent_world * t.local_matrix();
                        t.set_world(world);
                        world
                    }
                    None => parent_world,
                };
                if let Some(kids) = children.get(&entity) {
                    // Reversed so children are visited in attach order.
                    stack.extend(kids.iter().rev().map(|c| (*c, world)));
                }
            }
        }
    }

    // ---- Camera ----

    /// Returns false if the entity is dead or lacks a Camera.
    pub fn set_active_camera(&mut self, entity: Entity) -> bool {
        if self.has_component::<Camera>(entity) {
            self.active_camera = Some(entity);
            true
        } else {
            false
        }
    }

    /// The active camera, if it is still alive and has both a Camera and a
    /// Transform.
    pub fn active_camera(&self) -> Option<Entity> {
        self.active_camera.filter(|e| {
            self.entities.is_alive(*e)
                && self.has_component::<Camera>(*e)
                && self.has_component::<Transform>(*e)
        })
    }

    // ---- Iteration ----

    /// Visit every mesh renderer in dense order. Entities without a Transform
    /// are skipped.
    pub fn iterate_mesh_renderers<F>(&self, mut callback: F)
    where
        F: FnMut(Entity, &Transform, &MeshRenderer),
    {
        let (Some(renderers), Some(transforms)) =
            (self.storage::<MeshRenderer>(), self.storage::<Transform>())
        else {
            return;
        };
        for (entity, renderer) in renderers.entities().iter().zip(renderers.components()) {
            if let Some(transform) = transforms.get(*entity) {
                callback(*entity, transform, renderer);
            }
        }
    }

    /// Visit every light in dense order. Entities without a Transform are
    /// skipped.
    pub fn iterate_lights<F>(&self, mut callback: F)
    where
        F: FnMut(Entity, &Transform, &Light),
    {
        let (Some(lights), Some(transforms)) = (self.storage::<Light>(), self.storage::<Transform>())
        else {
            return;
        };
        for (entity, light) in lights.entities().iter().zip(lights.components()) {
            if let Some(transform) = transforms.get(*entity) {
                callback(*entity, transform, light);
            }
        }
    }

    // ---- Animation ----

    /// Advance every animator by `dt` seconds.
    pub fn update_animators(&mut self, dt: f32, resources: &Resources) {
        if let Some(animators) = self.components.storage_mut::<Animator>() {
            for (_, animator) in animators.iter_mut() {
                animator.update(dt, resources);
            }
        }
    }
}
