//! Scene to frame: camera, lights, culling, sky and mesh draws

use crate::backend::{FrameUniforms, GpuDevice};
use crate::render::frame::RenderFrame;
use crate::resources::{Environment, Resources};
use crate::scene::{view_matrix_from_world, Camera, LightKind, Scene, Transform};
use glam::{Mat4, Vec3};

/// Records a scene into a [`RenderFrame`].
///
/// Per frame, in order: resolve the camera, rebuild the light list, cull,
/// draw the sky, then draw every enabled mesh renderer in dense order.
/// Submitting and presenting stay with the caller through
/// [`RenderFrame::end`].
#[derive(Debug, Clone)]
pub struct RenderSystem {
    pub ambient_color: Vec3,
    pub ambient_intensity: f32,
    pub environment: Environment,
    pub draw_skybox: bool,
    /// Queue a debug cross at every point and spot light, sized by range
    pub debug_lights: bool,
}

impl Default for RenderSystem {
    fn default() -> Self {
        Self {
            ambient_color: Vec3::ONE,
            ambient_intensity: 0.03,
            environment: Environment::default(),
            draw_skybox: true,
            debug_lights: false,
        }
    }
}

impl RenderSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn render<D: GpuDevice>(
        &self,
        scene: &Scene,
        resources: &Resources,
        frame: &mut RenderFrame<'_, D>,
    ) {
        let Some((view, proj, eye)) = Self::camera_matrices(scene, frame.size()) else {
            log::trace!("No active camera, nothing to render");
            return;
        };
        if frame.forward_plus().is_none() {
            return;
        }

        self.collect_lights(scene, frame, view, proj);

        if let Err(e) = frame.cull_lights() {
            log::warn!("Light culling failed for frame {}: {}", frame.index(), e);
        }

        let uniforms = self.frame_uniforms(frame, view, proj, eye);
        frame.push_light_uniforms(&uniforms);

        if self.draw_skybox {
            frame.draw_skybox(view, proj, &self.environment);
        }

        scene.iterate_mesh_renderers(|_, transform, renderer| {
            if !renderer.enabled {
                return;
            }
            frame.draw_mesh_forward_plus(
                renderer.mesh,
                renderer.material,
                renderer.texture,
                transform.world_matrix(),
                view,
                proj,
                resources,
            );
        });
    }

    fn camera_matrices(scene: &Scene, (width, height): (u32, u32)) -> Option<(Mat4, Mat4, Vec3)> {
        let entity = scene.active_camera()?;
        let camera = scene.get_component::<Camera>(entity)?;
        let world = scene.get_component::<Transform>(entity)?.world_matrix();
        let proj = camera.projection_matrix(camera.aspect_for(width, height));
        Some((view_matrix_from_world(world), proj, world.w_axis.truncate()))
    }

    fn collect_lights<D: GpuDevice>(
        &self,
        scene: &Scene,
        frame: &mut RenderFrame<'_, D>,
        view: Mat4,
        proj: Mat4,
    ) {
        let (width, height) = frame.size();
        let mut crosses = Vec::new();
        let Some(forward) = frame.forward_plus_mut() else {
            return;
        };
        forward.clear_lights();
        forward.set_view_projection(view, proj, width, height);

        scene.iterate_lights(|_, transform, light| {
            let world = transform.world_matrix();
            let position = world.w_axis.truncate();
            let direction = (-world.z_axis.truncate()).normalize_or_zero();
            match light.kind {
                LightKind::Directional => {
                    if forward.directional_light().is_none() {
                        forward.set_directional_light(direction, light.color, light.intensity);
                    } else {
                        log::debug!("Ignoring extra directional light");
                    }
                }
                LightKind::Point => {
                    forward.add_point_light(position, light.range, light.color, light.intensity);
                    crosses.push((position, light.range, light.color));
                }
                LightKind::Spot {
                    inner_angle,
                    outer_angle,
                } => {
                    forward.add_spot_light(
                        position,
                        direction,
                        light.range,
                        light.color,
                        light.intensity,
                        inner_angle,
                        outer_angle,
                    );
                    crosses.push((position, light.range, light.color));
                }
            }
        });

        if self.debug_lights {
            let context = frame.context_mut();
            for (position, range, color) in crosses {
                context.cross(position, range, color.extend(1.0));
            }
        }
    }

    fn frame_uniforms<D: GpuDevice>(
        &self,
        frame: &RenderFrame<'_, D>,
        view: Mat4,
        proj: Mat4,
        eye: Vec3,
    ) -> FrameUniforms {
        let mut uniforms = FrameUniforms {
            view,
            view_proj: proj * view,
            camera_position: eye.extend(1.0),
            ambient: self.ambient_color.extend(self.ambient_intensity),
            environment: self.environment.uniform_data(),
            ..Default::default()
        };
        if let Some(forward) = frame.forward_plus() {
            uniforms.tile_info = forward.tile_info();
            if let Some(sun) = forward.directional_light() {
                uniforms.directional_direction = sun.direction.extend(1.0);
                uniforms.directional_color = sun.color.extend(sun.intensity);
            }
        }
        uniforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessDevice;
    use crate::config::EngineConfig;
    use crate::render::Renderer;
    use crate::resources::Mesh;
    use crate::scene::{Light, MeshRenderer};
    use glam::Vec4;

    fn scene_with_camera() -> Scene {
        let mut scene = Scene::new();
        let camera = scene.create_entity().unwrap();
        scene
            .add_component(camera, Transform::from_translation(Vec3::new(0.0, 0.0, 5.0)))
            .unwrap();
        scene.add_component(camera, Camera::default()).unwrap();
        scene.set_active_camera(camera);
        scene
    }

    #[test]
    fn no_camera_records_nothing() {
        let mut renderer = Renderer::new(HeadlessDevice::new(64, 64), EngineConfig::default()).unwrap();
        renderer.init_forward_plus().unwrap();
        let scene = Scene::new();
        let resources = Resources::new();
        let system = RenderSystem::new();

        let mut frame = renderer.begin_frame().unwrap();
        system.render(&scene, &resources, &mut frame);
        let stats = frame.end().unwrap();
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.pipeline_binds, 0);
    }

    #[test]
    fn disabled_renderers_are_skipped() {
        let mut renderer = Renderer::new(HeadlessDevice::new(64, 64), EngineConfig::default()).unwrap();
        renderer.init_forward_plus().unwrap();
        let mut scene = scene_with_camera();
        let mut resources = Resources::new();
        let mesh = resources.meshes.insert(Mesh::cube(), None).unwrap();
        for enabled in [true, false, true] {
            let e = scene.create_entity().unwrap();
            scene.add_component(e, Transform::new()).unwrap();
            let mut r = MeshRenderer::new(mesh);
            r.enabled = enabled;
            scene.add_component(e, r).unwrap();
        }
        let system = RenderSystem {
            draw_skybox: false,
            ..Default::default()
        };

        let mut frame = renderer.begin_frame().unwrap();
        system.render(&scene, &resources, &mut frame);
        let stats = frame.end().unwrap();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.pipeline_binds, 1);
    }

    #[test]
    fn directional_light_reaches_uniforms() {
        let mut renderer = Renderer::new(HeadlessDevice::new(64, 64), EngineConfig::default()).unwrap();
        renderer.init_forward_plus().unwrap();
        let mut scene = scene_with_camera();
        let sun = scene.create_entity().unwrap();
        scene.add_component(sun, Transform::new()).unwrap();
        scene
            .add_component(sun, Light::directional(Vec3::ONE, 2.0))
            .unwrap();
        let lamp = scene.create_entity().unwrap();
        scene.add_component(lamp, Transform::new()).unwrap();
        scene
            .add_component(lamp, Light::point(Vec3::X, 1.0, 3.0))
            .unwrap();
        let system = RenderSystem {
            debug_lights: true,
            ..Default::default()
        };

        let mut frame = renderer.begin_frame().unwrap();
        system.render(&scene, &Resources::new(), &mut frame);
        let uniforms = *frame.light_uniforms();
        assert_eq!(uniforms.directional_direction, Vec4::new(0.0, 0.0, -1.0, 1.0));
        assert_eq!(uniforms.directional_color.w, 2.0);
        assert_eq!(uniforms.tile_info[3], 1);
        assert_eq!(uniforms.camera_position, Vec4::new(0.0, 0.0, 5.0, 1.0));
        let stats = frame.end().unwrap();
        assert_eq!(stats.lights_submitted, 1);
        assert_eq!(stats.debug_lines, 3);
        assert_eq!(renderer.last_debug_lines().len(), 3);
    }
}
