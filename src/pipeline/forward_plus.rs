//! Forward+ light state
//!
//! Lights are accumulated on the CPU each frame, ordered, truncated and
//! uploaded, then culled into per-tile index lists either by a compute
//! dispatch or on the CPU. The shading pass reads both buffers through
//! [`ForwardPlus::bind_group`].

use super::light_culling::{CullingUniforms, LightCuller, TileGrid, TileLightLists, LIGHT_CULLING_SHADER};
use crate::backend::*;
use crate::config::{CullingMode, ForwardPlusConfig, TruncationPolicy};
use crate::scene::{DirectionalLight, GpuLightData};
use glam::{Mat4, Vec3};

/// Label of the command buffer carrying the culling dispatch
pub const LIGHT_CULLING_COMMANDS: &str = "light-culling";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullStats {
    /// Lights accumulated this frame
    pub submitted: u32,
    /// Lights written to the light buffer
    pub uploaded: u32,
    /// Lights dropped by the `max_lights` bound
    pub dropped: u32,
    pub tiles: u32,
    pub mode: CullingMode,
}

pub struct ForwardPlus {
    config: ForwardPlusConfig,
    mode: CullingMode,

    lights: Vec<GpuLightData>,
    uploaded: Vec<GpuLightData>,
    directional: Option<DirectionalLight>,
    view: Mat4,
    proj: Mat4,
    width: u32,
    height: u32,
    grid: TileGrid,
    lights_valid: bool,
    tile_lists: Option<TileLightLists>,

    light_buffer: BufferId,
    tile_buffer: BufferId,
    tile_buffer_size: u64,
    uniform_buffer: BufferId,
    culling_layout: BindGroupLayoutId,
    culling_pipeline: Option<ComputePipelineId>,
    culling_bind_group: BindGroupId,
    shading_layout: BindGroupLayoutId,
    shading_bind_group: BindGroupId,
}

impl ForwardPlus {
    pub fn new<D: GpuDevice>(device: &mut D, config: &ForwardPlusConfig) -> BackendResult<Self> {
        let config = config.validated();
        let (width, height) = device.surface_size();
        let grid = TileGrid::new(width, height, config.tile_size);

        let light_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("Forward+ Lights".into()),
            size: config.max_lights as u64 * std::mem::size_of::<GpuLightData>() as u64,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
        })?;
        let tile_buffer_size = Self::tile_buffer_bytes(grid, config.max_lights_per_tile);
        let tile_buffer = Self::create_tile_buffer(device, tile_buffer_size)?;
        let uniform_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("Forward+ Culling Uniforms".into()),
            size: std::mem::size_of::<CullingUniforms>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;

        let culling_layout = device.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::COMPUTE,
                ty: BindingType::UniformBuffer,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::COMPUTE,
                ty: BindingType::StorageBuffer { read_only: true },
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStageFlags::COMPUTE,
                ty: BindingType::StorageBuffer { read_only: false },
            },
        ])?;
        let shading_layout = device.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::StorageBuffer { read_only: true },
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::StorageBuffer { read_only: true },
            },
        ])?;

        let mut mode = config.culling;
        let culling_pipeline = match mode {
            CullingMode::Gpu => {
                match device.create_compute_pipeline(&ComputePipelineDescriptor {
                    label: Some("Light Culling".into()),
                    shader: LIGHT_CULLING_SHADER.to_string(),
                    entry_point: "main".into(),
                    bind_group_layouts: vec![culling_layout],
                }) {
                    Ok(pipeline) => Some(pipeline),
                    Err(err) => {
                        log::warn!("Light culling pipeline unavailable ({}), culling on the CPU", err);
                        mode = CullingMode::Cpu;
                        None
                    }
                }
            }
            CullingMode::Cpu => None,
        };

        let (culling_bind_group, shading_bind_group) = Self::create_bind_groups(
            device,
            culling_layout,
            shading_layout,
            uniform_buffer,
            light_buffer,
            tile_buffer,
        )?;

        log::debug!(
            "Forward+ initialized: {}x{} tiles of {} px, {} lights, {} per tile, {:?} culling",
            grid.tiles_x,
            grid.tiles_y,
            grid.tile_size,
            config.max_lights,
            config.max_lights_per_tile,
            mode
        );

        Ok(Self {
            config,
            mode,
            lights: Vec::new(),
            uploaded: Vec::new(),
            directional: None,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            width,
            height,
            grid,
            lights_valid: false,
            tile_lists: None,
            light_buffer,
            tile_buffer,
            tile_buffer_size,
            uniform_buffer,
            culling_layout,
            culling_pipeline,
            culling_bind_group,
            shading_layout,
            shading_bind_group,
        })
    }

    fn tile_buffer_bytes(grid: TileGrid, capacity: u32) -> u64 {
        grid.tile_count() as u64 * (capacity as u64 + 1) * 4
    }

    fn create_tile_buffer<D: GpuDevice>(device: &mut D, size: u64) -> BackendResult<BufferId> {
        device.create_buffer(&BufferDescriptor {
            label: Some("Forward+ Tile Lights".into()),
            size,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
        })
    }

    fn create_bind_groups<D: GpuDevice>(
        device: &mut D,
        culling_layout: BindGroupLayoutId,
        shading_layout: BindGroupLayoutId,
        uniforms: BufferId,
        lights: BufferId,
        tiles: BufferId,
    ) -> BackendResult<(BindGroupId, BindGroupId)> {
        let buffer = |buffer| BindGroupEntry::Buffer {
            buffer,
            offset: 0,
            size: None,
        };
        let culling = device.create_bind_group(
            culling_layout,
            &[(0, buffer(uniforms)), (1, buffer(lights)), (2, buffer(tiles))],
        )?;
        let shading = device.create_bind_group(shading_layout, &[(0, buffer(lights)), (1, buffer(tiles))])?;
        Ok((culling, shading))
    }

    /// Start a new frame's accumulation. Also forgets the directional light.
    pub fn clear_lights(&mut self) {
        self.lights.clear();
        self.directional = None;
        self.lights_valid = false;
    }

    pub fn set_view_projection(&mut self, view: Mat4, proj: Mat4, width: u32, height: u32) {
        self.view = view;
        self.proj = proj;
        self.width = width.max(1);
        self.height = height.max(1);
        self.grid = TileGrid::new(self.width, self.height, self.config.tile_size);
    }

    pub fn add_point_light(&mut self, position: Vec3, range: f32, color: Vec3, intensity: f32) {
        self.lights
            .push(GpuLightData::point(position, range.max(0.0), color, intensity));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_spot_light(
        &mut self,
        position: Vec3,
        direction: Vec3,
        range: f32,
        color: Vec3,
        intensity: f32,
        inner_angle: f32,
        outer_angle: f32,
    ) {
        if direction.length_squared() <= f32::EPSILON {
            log::debug!("Spot light at {} has no direction, tiling it as a point light", position);
            self.add_point_light(position, range, color, intensity);
            return;
        }
        self.lights.push(GpuLightData::spot(
            position,
            direction,
            range.max(0.0),
            color,
            intensity,
            inner_angle.min(outer_angle),
            outer_angle,
        ));
    }

    pub fn set_directional_light(&mut self, direction: Vec3, color: Vec3, intensity: f32) {
        self.directional = Some(DirectionalLight {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
        });
    }

    /// Lights in upload order, after sorting and truncation
    fn ordered_lights(&self) -> Vec<GpuLightData> {
        let mut ordered = self.lights.clone();
        if self.config.truncation == TruncationPolicy::NearestFirst {
            let eye = self.view.inverse().w_axis.truncate();
            ordered.sort_by(|a, b| {
                let da = a.position().distance_squared(eye);
                let db = b.position().distance_squared(eye);
                da.total_cmp(&db)
            });
        }
        ordered.truncate(self.config.max_lights as usize);
        ordered
    }

    fn ensure_tile_buffer<D: GpuDevice>(&mut self, device: &mut D) -> BackendResult<()> {
        let needed = Self::tile_buffer_bytes(self.grid, self.config.max_lights_per_tile);
        if needed <= self.tile_buffer_size {
            return Ok(());
        }
        let tile_buffer = Self::create_tile_buffer(device, needed)?;
        let (culling, shading) = Self::create_bind_groups(
            device,
            self.culling_layout,
            self.shading_layout,
            self.uniform_buffer,
            self.light_buffer,
            tile_buffer,
        )?;
        device.destroy_buffer(self.tile_buffer);
        log::debug!("Resized tile light buffer to {} bytes", needed);
        self.tile_buffer = tile_buffer;
        self.tile_buffer_size = needed;
        self.culling_bind_group = culling;
        self.shading_bind_group = shading;
        Ok(())
    }

    /// Upload this frame's lights and build the tile lists. On error the
    /// lists are marked invalid for the frame and shading skips tiled
    /// lights.
    pub fn cull_lights<D: GpuDevice>(&mut self, device: &mut D) -> BackendResult<CullStats> {
        self.lights_valid = false;
        self.tile_lists = None;

        let ordered = self.ordered_lights();
        let submitted = self.lights.len() as u32;
        let uploaded = ordered.len() as u32;
        if uploaded < submitted {
            log::debug!(
                "Forward+ light budget exceeded: {} submitted, {} kept",
                submitted,
                uploaded
            );
        }

        self.ensure_tile_buffer(device)?;
        if !ordered.is_empty() {
            device.write_buffer(self.light_buffer, 0, bytemuck::cast_slice(&ordered));
        }
        let capacity = self.config.max_lights_per_tile;

        match (self.mode, self.culling_pipeline) {
            (CullingMode::Gpu, Some(pipeline)) => {
                let uniforms = CullingUniforms::new(
                    self.view,
                    self.proj,
                    self.width,
                    self.height,
                    self.grid,
                    uploaded,
                    capacity,
                );
                device.write_buffer(self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

                let mut commands = device.acquire_command_buffer(LIGHT_CULLING_COMMANDS)?;
                let (groups_x, groups_y) = self.grid.workgroups();
                commands.begin_compute_pass(Some("Light Culling"));
                commands.set_compute_pipeline(pipeline);
                commands.set_bind_group(0, self.culling_bind_group);
                commands.dispatch(groups_x, groups_y, 1);
                commands.end_compute_pass();
                device.submit(commands)?;

                if self.config.cpu_preview {
                    self.tile_lists = Some(self.cpu_cull(&ordered));
                }
            }
            _ => {
                let lists = self.cpu_cull(&ordered);
                device.write_buffer(self.tile_buffer, 0, bytemuck::cast_slice(lists.as_words()));
                self.tile_lists = Some(lists);
            }
        }

        self.uploaded = ordered;
        self.lights_valid = true;
        Ok(CullStats {
            submitted,
            uploaded,
            dropped: submitted - uploaded,
            tiles: self.grid.tile_count(),
            mode: self.mode,
        })
    }

    fn cpu_cull(&self, lights: &[GpuLightData]) -> TileLightLists {
        LightCuller::new(self.view, self.proj, self.width, self.height, self.config.tile_size)
            .cull(lights, self.config.max_lights_per_tile)
    }

    pub fn config(&self) -> &ForwardPlusConfig {
        &self.config
    }

    /// Mode in effect; GPU mode falls back to CPU when the compute
    /// pipeline could not be created
    pub fn culling_mode(&self) -> CullingMode {
        self.mode
    }

    pub fn accumulated_light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn uploaded_light_count(&self) -> u32 {
        self.uploaded.len() as u32
    }

    pub fn uploaded_lights(&self) -> &[GpuLightData] {
        &self.uploaded
    }

    pub fn directional_light(&self) -> Option<DirectionalLight> {
        self.directional
    }

    pub fn lights_valid(&self) -> bool {
        self.lights_valid
    }

    /// Tile lists built on the CPU by the last cull, if any
    pub fn tile_lists(&self) -> Option<&TileLightLists> {
        self.tile_lists.as_ref()
    }

    pub fn tile_light_indices(&self, tx: u32, ty: u32) -> &[u32] {
        self.tile_lists
            .as_ref()
            .map_or(&[], |lists| lists.light_indices(tx, ty))
    }

    pub fn tile_grid(&self) -> TileGrid {
        self.grid
    }

    pub fn tile_counts(&self) -> (u32, u32) {
        (self.grid.tiles_x, self.grid.tiles_y)
    }

    /// Group 2 of the shading pipeline: lights and tile lists
    pub fn bind_group(&self) -> BindGroupId {
        self.shading_bind_group
    }

    pub fn bind_group_layout(&self) -> BindGroupLayoutId {
        self.shading_layout
    }

    /// Values for `FrameUniforms::tile_info`
    pub fn tile_info(&self) -> [u32; 4] {
        [
            self.grid.tiles_x,
            self.grid.tile_size,
            self.config.max_lights_per_tile + 1,
            self.lights_valid as u32,
        ]
    }

    pub fn light_buffer(&self) -> BufferId {
        self.light_buffer
    }

    pub fn tile_buffer(&self) -> BufferId {
        self.tile_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(config: ForwardPlusConfig) -> (HeadlessDevice, ForwardPlus) {
        let mut device = HeadlessDevice::new(128, 128);
        let mut fp = ForwardPlus::new(&mut device, &config).unwrap();
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        fp.set_view_projection(view, proj, 128, 128);
        (device, fp)
    }

    #[test]
    fn nearest_first_is_stable() {
        let (mut device, mut fp) = setup(ForwardPlusConfig {
            max_lights: 3,
            culling: CullingMode::Cpu,
            ..Default::default()
        });
        fp.clear_lights();
        fp.add_point_light(Vec3::new(0.0, 0.0, -10.0), 1.0, Vec3::X, 1.0);
        fp.add_point_light(Vec3::new(1.0, 0.0, 0.0), 1.0, Vec3::Y, 1.0);
        fp.add_point_light(Vec3::new(-1.0, 0.0, 0.0), 1.0, Vec3::Z, 1.0);
        fp.add_point_light(Vec3::new(0.0, 0.0, 4.0), 1.0, Vec3::ONE, 1.0);

        let stats = fp.cull_lights(&mut device).unwrap();
        assert_eq!((stats.submitted, stats.uploaded, stats.dropped), (4, 3, 1));
        let colors: Vec<Vec3> = fp
            .uploaded_lights()
            .iter()
            .map(|l| l.color_intensity.truncate())
            .collect();
        assert_eq!(colors, vec![Vec3::ONE, Vec3::Y, Vec3::Z]);
    }

    #[test]
    fn insertion_order_truncates_tail() {
        let (mut device, mut fp) = setup(ForwardPlusConfig {
            max_lights: 2,
            culling: CullingMode::Cpu,
            truncation: TruncationPolicy::InsertionOrder,
            ..Default::default()
        });
        for z in [-10.0, -5.0, 4.0] {
            fp.add_point_light(Vec3::new(0.0, 0.0, z), 1.0, Vec3::ONE, 1.0);
        }
        fp.cull_lights(&mut device).unwrap();
        let zs: Vec<f32> = fp.uploaded_lights().iter().map(|l| l.position().z).collect();
        assert_eq!(zs, vec![-10.0, -5.0]);
    }

    #[test]
    fn cpu_mode_uploads_tile_words() {
        let (mut device, mut fp) = setup(ForwardPlusConfig {
            max_lights_per_tile: 4,
            culling: CullingMode::Cpu,
            ..Default::default()
        });
        fp.add_point_light(Vec3::ZERO, 1.0, Vec3::ONE, 1.0);
        fp.cull_lights(&mut device).unwrap();

        let lists = fp.tile_lists().unwrap();
        let bytes = device.buffer_contents(fp.tile_buffer()).unwrap();
        let uploaded: Vec<u32> = bytes
            .chunks_exact(4)
            .take(lists.as_words().len())
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        assert_eq!(uploaded, lists.as_words());
        assert!(device.probe().lock().submissions.is_empty());
    }

    #[test]
    fn gpu_mode_dispatches_per_tile_groups() {
        let (mut device, mut fp) = setup(ForwardPlusConfig::default());
        fp.add_point_light(Vec3::ZERO, 1.0, Vec3::ONE, 1.0);
        fp.cull_lights(&mut device).unwrap();
        assert!(fp.lights_valid());
        assert!(fp.tile_lists().is_none());

        let log = device.probe();
        let log = log.lock();
        assert_eq!(log.labels(), vec![LIGHT_CULLING_COMMANDS]);
        assert_eq!(
            log.count(|c| matches!(c, GpuCommand::Dispatch { x: 1, y: 1, z: 1 })),
            1
        );
    }

    #[test]
    fn zero_lights_leave_every_tile_empty() {
        let (mut device, mut fp) = setup(ForwardPlusConfig {
            culling: CullingMode::Cpu,
            ..Default::default()
        });
        let stats = fp.cull_lights(&mut device).unwrap();
        assert_eq!((stats.submitted, stats.uploaded), (0, 0));
        assert!(fp.lights_valid());
        assert_eq!(fp.tile_info()[3], 1);
        assert_eq!(fp.tile_lists().unwrap().total_entries(), 0);

        fp.add_point_light(Vec3::ZERO, 1.0, Vec3::ONE, 1.0);
        fp.cull_lights(&mut device).unwrap();
        assert!(fp.tile_lists().unwrap().total_entries() > 0);

        fp.clear_lights();
        fp.cull_lights(&mut device).unwrap();
        assert!(fp.lights_valid());
        assert!(fp.uploaded_lights().is_empty());
        let lists = fp.tile_lists().unwrap();
        assert_eq!(lists.total_entries(), 0);
        let (tiles_x, tiles_y) = fp.tile_counts();
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                assert!(lists.light_indices(tx, ty).is_empty());
            }
        }
        let bytes = device.buffer_contents(fp.tile_buffer()).unwrap();
        assert!(bytes
            .chunks_exact(4)
            .take(lists.as_words().len())
            .all(|w| w.iter().all(|b| *b == 0)));
    }

    #[test]
    fn gpu_cull_with_no_lights_stays_valid() {
        let (mut device, mut fp) = setup(ForwardPlusConfig::default());
        fp.cull_lights(&mut device).unwrap();
        assert!(fp.lights_valid());
        assert_eq!(fp.uploaded_light_count(), 0);
        let log = device.probe();
        assert_eq!(log.lock().labels(), vec![LIGHT_CULLING_COMMANDS]);
    }

    #[test]
    fn failed_acquire_invalidates_lights() {
        let (mut device, mut fp) = setup(ForwardPlusConfig::default());
        device.fail_acquire(LIGHT_CULLING_COMMANDS);
        fp.add_point_light(Vec3::ZERO, 1.0, Vec3::ONE, 1.0);
        assert!(fp.cull_lights(&mut device).is_err());
        assert!(!fp.lights_valid());
        assert_eq!(fp.tile_info()[3], 0);
        assert!(device.probe().lock().submissions.is_empty());
    }

    #[test]
    fn failed_submit_invalidates_lights() {
        let (mut device, mut fp) = setup(ForwardPlusConfig::default());
        device.fail_submit(LIGHT_CULLING_COMMANDS);
        fp.add_point_light(Vec3::ZERO, 1.0, Vec3::ONE, 1.0);
        assert!(fp.cull_lights(&mut device).is_err());
        assert!(!fp.lights_valid());
        assert_eq!(fp.tile_info()[3], 0);
    }

    #[test]
    fn larger_viewport_grows_tile_buffer() {
        let (mut device, mut fp) = setup(ForwardPlusConfig {
            culling: CullingMode::Cpu,
            ..Default::default()
        });
        let before = fp.tile_buffer();
        fp.set_view_projection(Mat4::IDENTITY, Mat4::perspective_rh(1.0, 2.0, 0.1, 10.0), 512, 256);
        fp.cull_lights(&mut device).unwrap();
        assert_ne!(fp.tile_buffer(), before);
        assert_eq!(fp.tile_counts(), (32, 16));
    }
}
