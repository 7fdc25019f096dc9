use glam::{Quat, Vec3};
use zdl_engine::core::Storage;
use zdl_engine::ecs::{ComponentStorage, Entity, EntityManager};
use zdl_engine::resources::{Mesh, Resources};
use zdl_engine::scene::{MeshRenderer, Name, Scene, Transform};

#[test]
fn stale_handle_survives_slot_reuse() {
    let mut storage: Storage<String> = Storage::new();
    let old = storage.insert("first".into(), Some("slot")).unwrap();
    storage.add_ref(old);
    assert!(!storage.release(old));
    assert!(storage.release(old));
    storage.remove(old);

    let new = storage.insert("second".into(), None).unwrap();
    assert_eq!(new.index(), old.index());
    assert!(storage.get(old).is_none());
    assert_eq!(storage.get(new).map(String::as_str), Some("second"));
    assert!(storage.get_by_name("slot").is_none());
}

fn entities(n: usize) -> Vec<Entity> {
    let mut manager = EntityManager::new();
    (0..n).map(|_| manager.create().unwrap()).collect()
}

#[test]
fn sparse_set_removal_keeps_other_values() {
    let all = entities(11);
    let (e0, e5, e10) = (all[0], all[5], all[10]);
    let mut storage = ComponentStorage::new();
    storage.insert(e0, 1).unwrap();
    storage.insert(e5, 2).unwrap();
    storage.insert(e10, 3).unwrap();

    assert_eq!(storage.remove(e5), Some(2));
    assert_eq!(storage.get(e0), Some(&1));
    assert_eq!(storage.get(e10), Some(&3));
    assert!(!storage.contains(e5));
    assert_eq!(storage.len(), 2);
    assert!(storage.check_integrity());
}

#[test]
fn sparse_set_integrity_under_churn() {
    let all = entities(32);
    let mut storage = ComponentStorage::new();
    for (i, e) in all.iter().enumerate() {
        storage.insert(*e, i).unwrap();
        if i % 3 == 0 {
            storage.remove(all[i / 2]);
        }
        assert!(storage.check_integrity());
        assert_eq!(storage.entities().len(), storage.len());
    }
    for e in storage.entities() {
        assert!(storage.contains(*e));
    }
}

#[test]
fn world_transforms_follow_chain() {
    let mut scene = Scene::new();
    let spawn = |scene: &mut Scene, t: Vec3| {
        let e = scene.create_entity().unwrap();
        scene.add_component(e, Transform::from_translation(t)).unwrap();
        e
    };
    let root = spawn(&mut scene, Vec3::X);
    let mid = spawn(&mut scene, Vec3::Y);
    let leaf = spawn(&mut scene, Vec3::Z);
    scene.set_parent(mid, root).unwrap();
    scene.set_parent(leaf, mid).unwrap();

    scene.update_world_transforms();
    let pos = scene.get_component::<Transform>(leaf).unwrap().world_position();
    assert!(pos.abs_diff_eq(Vec3::ONE, 1e-6));
}

#[test]
fn destroying_parent_orphans_children_in_place() {
    let mut scene = Scene::new();
    let parent = scene.create_entity().unwrap();
    scene
        .add_component(
            parent,
            Transform::from_translation_rotation(
                Vec3::new(3.0, 0.0, 0.0),
                Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            ),
        )
        .unwrap();
    let child = scene.create_entity().unwrap();
    scene
        .add_component(child, Transform::from_translation(Vec3::new(0.0, 0.0, 2.0)))
        .unwrap();
    scene.set_parent(child, parent).unwrap();
    scene.update_world_transforms();
    let before = scene.get_component::<Transform>(child).unwrap().world_position();

    assert!(scene.destroy_entity(parent));
    assert_eq!(scene.parent_of(child), None);
    scene.update_world_transforms();
    let after = scene.get_component::<Transform>(child).unwrap().world_position();
    assert!(before.abs_diff_eq(after, 1e-5));
}

#[test]
fn mesh_renderer_order_is_stable() {
    let mut scene = Scene::new();
    let mut resources = Resources::new();
    let mesh = resources.meshes.insert(Mesh::cube(), None).unwrap();
    let mut added = Vec::new();
    for i in 0..8 {
        let e = scene.create_named(&format!("mesh{}", i)).unwrap();
        scene.add_component(e, Transform::new()).unwrap();
        scene.add_component(e, MeshRenderer::new(mesh)).unwrap();
        added.push(e);
    }

    let collect = |scene: &Scene| {
        let mut order = Vec::new();
        scene.iterate_mesh_renderers(|e, _, _| order.push(e));
        order
    };
    let first = collect(&scene);
    let second = collect(&scene);
    assert_eq!(first, added);
    assert_eq!(first, second);
    assert_eq!(
        scene.get_component::<Name>(first[3]).map(Name::as_str),
        Some("mesh3")
    );
}
