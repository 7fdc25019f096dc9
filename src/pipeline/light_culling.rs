//! Tiled light culling for Forward+
//!
//! The screen is split into square tiles. Each tile gets a view-space
//! frustum (four side planes through the eye plus the near/far range) and
//! every light's bounding sphere is tested against it. The CPU culler and
//! [`LIGHT_CULLING_SHADER`] implement the same test.

use crate::scene::GpuLightData;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// `cos` of the widest spot cone accepted; wider cones are clamped to it.
const MIN_SPOT_COS: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub tile_size: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        let tile_size = tile_size.max(1);
        let width = width.max(1);
        let height = height.max(1);
        Self {
            tile_size,
            tiles_x: (width + tile_size - 1) / tile_size,
            tiles_y: (height + tile_size - 1) / tile_size,
        }
    }

    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Tile containing pixel `(x, y)`, origin at the top left
    pub fn tile_at_pixel(&self, x: u32, y: u32) -> (u32, u32) {
        (
            (x / self.tile_size).min(self.tiles_x - 1),
            (y / self.tile_size).min(self.tiles_y - 1),
        )
    }

    /// Compute workgroups needed for one invocation per tile
    pub fn workgroups(&self) -> (u32, u32) {
        ((self.tiles_x + 7) / 8, (self.tiles_y + 7) / 8)
    }
}

/// Per-tile light lists laid out exactly like the GPU tile buffer: each tile
/// owns `capacity + 1` words, a count followed by light indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLightLists {
    grid: TileGrid,
    capacity: u32,
    words: Vec<u32>,
}

impl TileLightLists {
    pub fn empty(grid: TileGrid, capacity: u32) -> Self {
        let stride = capacity as usize + 1;
        Self {
            grid,
            capacity,
            words: vec![0; grid.tile_count() as usize * stride],
        }
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn stride(&self) -> u32 {
        self.capacity + 1
    }

    fn base(&self, tx: u32, ty: u32) -> Option<usize> {
        if tx >= self.grid.tiles_x || ty >= self.grid.tiles_y {
            return None;
        }
        Some((ty * self.grid.tiles_x + tx) as usize * self.stride() as usize)
    }

    /// Light indices recorded for a tile; empty for out-of-range tiles
    pub fn light_indices(&self, tx: u32, ty: u32) -> &[u32] {
        match self.base(tx, ty) {
            Some(base) => {
                let count = self.words[base] as usize;
                &self.words[base + 1..base + 1 + count]
            }
            None => &[],
        }
    }

    /// Append a light to a tile. Returns false when the tile is full.
    pub fn push(&mut self, tx: u32, ty: u32, light: u32) -> bool {
        let Some(base) = self.base(tx, ty) else {
            return false;
        };
        let count = self.words[base];
        if count >= self.capacity {
            return false;
        }
        self.words[base + 1 + count as usize] = light;
        self.words[base] = count + 1;
        true
    }

    pub fn total_entries(&self) -> u64 {
        self.words
            .chunks(self.stride() as usize)
            .map(|tile| tile[0] as u64)
            .sum()
    }

    pub fn tiles_with_lights(&self) -> u32 {
        self.words
            .chunks(self.stride() as usize)
            .filter(|tile| tile[0] > 0)
            .count() as u32
    }

    pub fn as_words(&self) -> &[u32] {
        &self.words
    }
}

/// View-space frustum of one tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileFrustum {
    /// Inward normals of the left, right, top and bottom planes; all pass
    /// through the eye
    pub planes: [Vec3; 4],
    pub near: f32,
    pub far: f32,
}

impl TileFrustum {
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let depth = -center.z;
        if depth + radius < self.near || depth - radius > self.far {
            return false;
        }
        self.planes.iter().all(|n| n.dot(center) >= -radius)
    }
}

/// Near and far distances encoded in a perspective projection. An infinite
/// far plane is reported as `f32::MAX`.
pub fn depth_range(proj: Mat4) -> (f32, f32) {
    let inv = proj.inverse();
    let unproject_z = |z: f32| {
        let p = inv * Vec4::new(0.0, 0.0, z, 1.0);
        if p.w.abs() < f32::EPSILON {
            f32::MAX
        } else {
            (-p.z / p.w).min(f32::MAX)
        }
    };
    (unproject_z(0.0), unproject_z(1.0))
}

/// View-space bounding sphere of a tiled light. Spot lights use the tight
/// sphere around their cone.
pub fn light_view_sphere(view: Mat4, light: &GpuLightData) -> (Vec3, f32) {
    let range = light.range();
    let pos = view.transform_point3(light.position());
    if !light.is_spot() {
        return (pos, range);
    }
    let dir = view.transform_vector3(light.direction()).normalize_or_zero();
    let cos_a = light.cos_outer().clamp(MIN_SPOT_COS, 1.0);
    if cos_a < std::f32::consts::FRAC_1_SQRT_2 {
        let sin_a = (1.0 - cos_a * cos_a).sqrt();
        (pos + dir * range * cos_a, range * sin_a)
    } else {
        let r = range / (2.0 * cos_a);
        (pos + dir * r, r)
    }
}

/// CPU version of the culling dispatch
#[derive(Debug, Clone)]
pub struct LightCuller {
    view: Mat4,
    inv_proj: Mat4,
    size: Vec2,
    grid: TileGrid,
    near: f32,
    far: f32,
}

impl LightCuller {
    pub fn new(view: Mat4, proj: Mat4, width: u32, height: u32, tile_size: u32) -> Self {
        let (near, far) = depth_range(proj);
        Self {
            view,
            inv_proj: proj.inverse(),
            size: Vec2::new(width.max(1) as f32, height.max(1) as f32),
            grid: TileGrid::new(width, height, tile_size),
            near,
            far,
        }
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    pub fn near_far(&self) -> (f32, f32) {
        (self.near, self.far)
    }

    /// Point on the view ray through pixel `px`
    fn unproject(&self, px: Vec2) -> Vec3 {
        let ndc = Vec2::new(px.x / self.size.x * 2.0 - 1.0, 1.0 - px.y / self.size.y * 2.0);
        let p = self.inv_proj * Vec4::new(ndc.x, ndc.y, 0.5, 1.0);
        p.truncate() / p.w
    }

    pub fn tile_frustum(&self, tx: u32, ty: u32) -> TileFrustum {
        let tile = self.grid.tile_size as f32;
        let min = Vec2::new(tx as f32 * tile, ty as f32 * tile);
        let max = (min + Vec2::splat(tile)).min(self.size);

        let top_left = self.unproject(min);
        let top_right = self.unproject(Vec2::new(max.x, min.y));
        let bottom_left = self.unproject(Vec2::new(min.x, max.y));
        let bottom_right = self.unproject(max);
        let center = self.unproject((min + max) * 0.5);

        let inward = |a: Vec3, b: Vec3| {
            let n = a.cross(b).normalize_or_zero();
            if n.dot(center) < 0.0 {
                -n
            } else {
                n
            }
        };

        TileFrustum {
            planes: [
                inward(top_left, bottom_left),
                inward(top_right, bottom_right),
                inward(top_left, top_right),
                inward(bottom_left, bottom_right),
            ],
            near: self.near,
            far: self.far,
        }
    }

    /// Build per-tile lists. Lights are appended in slice order, so a tile
    /// that overflows keeps the first `capacity` lights it sees.
    pub fn cull(&self, lights: &[GpuLightData], capacity: u32) -> TileLightLists {
        let mut lists = TileLightLists::empty(self.grid, capacity);
        if lights.is_empty() || capacity == 0 {
            return lists;
        }
        let spheres: Vec<(Vec3, f32)> = lights
            .iter()
            .map(|light| light_view_sphere(self.view, light))
            .collect();

        for ty in 0..self.grid.tiles_y {
            for tx in 0..self.grid.tiles_x {
                let frustum = self.tile_frustum(tx, ty);
                for (i, (center, radius)) in spheres.iter().enumerate() {
                    if frustum.intersects_sphere(*center, *radius) && !lists.push(tx, ty, i as u32) {
                        break;
                    }
                }
            }
        }
        lists
    }
}

/// Uniform block of the culling dispatch
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CullingUniforms {
    pub view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    /// x = width, y = height, z = near, w = far
    pub screen: Vec4,
    /// x = tiles_x, y = tiles_y, z = tile size, w = light count
    pub params: [u32; 4],
    /// x = per-tile capacity, y = tile stride in words
    pub params2: [u32; 4],
}

impl CullingUniforms {
    pub fn new(
        view: Mat4,
        proj: Mat4,
        width: u32,
        height: u32,
        grid: TileGrid,
        light_count: u32,
        capacity: u32,
    ) -> Self {
        let (near, far) = depth_range(proj);
        Self {
            view,
            proj,
            inv_proj: proj.inverse(),
            screen: Vec4::new(width.max(1) as f32, height.max(1) as f32, near, far),
            params: [grid.tiles_x, grid.tiles_y, grid.tile_size, light_count],
            params2: [capacity, capacity + 1, 0, 0],
        }
    }
}

pub const LIGHT_CULLING_SHADER: &str = r#"
struct Light {
    position_range: vec4<f32>,
    color_intensity: vec4<f32>,
    direction_type: vec4<f32>,
    spot_params: vec4<f32>,
}

struct CullingUniforms {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    inv_proj: mat4x4<f32>,
    screen: vec4<f32>,
    params: vec4<u32>,
    params2: vec4<u32>,
}

@group(0) @binding(0) var<uniform> culling: CullingUniforms;
@group(0) @binding(1) var<storage, read> lights: array<Light>;
@group(0) @binding(2) var<storage, read_write> tiles: array<u32>;

const MIN_SPOT_COS: f32 = 0.001;

fn unproject(px: vec2<f32>) -> vec3<f32> {
    let ndc = vec2<f32>(px.x / culling.screen.x * 2.0 - 1.0, 1.0 - px.y / culling.screen.y * 2.0);
    let p = culling.inv_proj * vec4<f32>(ndc, 0.5, 1.0);
    return p.xyz / p.w;
}

fn inward_plane(a: vec3<f32>, b: vec3<f32>, inside: vec3<f32>) -> vec3<f32> {
    var n = normalize(cross(a, b));
    if dot(n, inside) < 0.0 {
        n = -n;
    }
    return n;
}

fn bounding_sphere(light: Light) -> vec4<f32> {
    let range = light.position_range.w;
    let pos = (culling.view * vec4<f32>(light.position_range.xyz, 1.0)).xyz;
    if light.direction_type.w < 0.5 {
        return vec4<f32>(pos, range);
    }
    let dir = normalize((culling.view * vec4<f32>(light.direction_type.xyz, 0.0)).xyz);
    let cos_a = clamp(light.spot_params.y, MIN_SPOT_COS, 1.0);
    if cos_a < 0.70710678 {
        let sin_a = sqrt(1.0 - cos_a * cos_a);
        return vec4<f32>(pos + dir * range * cos_a, range * sin_a);
    }
    let r = range / (2.0 * cos_a);
    return vec4<f32>(pos + dir * r, r);
}

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let tiles_x = culling.params.x;
    let tiles_y = culling.params.y;
    if global_id.x >= tiles_x || global_id.y >= tiles_y {
        return;
    }

    let tile_size = f32(culling.params.z);
    let capacity = culling.params2.x;
    let base = (global_id.y * tiles_x + global_id.x) * culling.params2.y;

    let tile_min = vec2<f32>(f32(global_id.x), f32(global_id.y)) * tile_size;
    let tile_max = min(tile_min + vec2<f32>(tile_size), culling.screen.xy);

    let top_left = unproject(tile_min);
    let top_right = unproject(vec2<f32>(tile_max.x, tile_min.y));
    let bottom_left = unproject(vec2<f32>(tile_min.x, tile_max.y));
    let bottom_right = unproject(tile_max);
    let center = unproject((tile_min + tile_max) * 0.5);

    let left = inward_plane(top_left, bottom_left, center);
    let right = inward_plane(top_right, bottom_right, center);
    let top = inward_plane(top_left, top_right, center);
    let bottom = inward_plane(bottom_left, bottom_right, center);

    var count = 0u;
    for (var i = 0u; i < culling.params.w; i = i + 1u) {
        if count >= capacity {
            break;
        }
        let sphere = bounding_sphere(lights[i]);
        let depth = -sphere.z;
        if depth + sphere.w < culling.screen.z || depth - sphere.w > culling.screen.w {
            continue;
        }
        if dot(left, sphere.xyz) < -sphere.w || dot(right, sphere.xyz) < -sphere.w
            || dot(top, sphere.xyz) < -sphere.w || dot(bottom, sphere.xyz) < -sphere.w {
            continue;
        }
        tiles[base + 1u + count] = i;
        count = count + 1u;
    }
    tiles[base] = count;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::GpuLightData;

    fn culler() -> LightCuller {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        LightCuller::new(view, proj, 128, 128, 16)
    }

    #[test]
    fn grid_rounds_up() {
        let grid = TileGrid::new(1920, 1080, 16);
        assert_eq!((grid.tiles_x, grid.tiles_y), (120, 68));
        assert_eq!(grid.workgroups(), (15, 9));
        assert_eq!(grid.tile_at_pixel(1919, 1079), (119, 67));
    }

    #[test]
    fn depth_range_matches_projection() {
        let (near, far) = depth_range(Mat4::perspective_rh(1.0, 1.5, 0.5, 200.0));
        assert!((near - 0.5).abs() < 1e-4);
        assert!((far - 200.0).abs() < 0.1);
    }

    #[test]
    fn light_at_focus_hits_center_tile() {
        let culler = culler();
        let lists = culler.cull(&[GpuLightData::point(Vec3::ZERO, 1.0, Vec3::ONE, 1.0)], 8);
        let (tx, ty) = lists.grid().tile_at_pixel(64, 64);
        assert_eq!(lists.light_indices(tx, ty), &[0]);
        // Corner tiles are outside a radius-1 sphere five units away
        assert!(lists.light_indices(0, 0).is_empty());
    }

    #[test]
    fn light_behind_camera_hits_nothing() {
        let culler = culler();
        let lights = [
            GpuLightData::point(Vec3::new(0.0, 0.0, 50.0), 2.0, Vec3::ONE, 1.0),
            GpuLightData::point(Vec3::new(0.0, 0.0, -500.0), 2.0, Vec3::ONE, 1.0),
            GpuLightData::point(Vec3::new(300.0, 0.0, 0.0), 2.0, Vec3::ONE, 1.0),
        ];
        assert_eq!(culler.cull(&lights, 8).total_entries(), 0);
    }

    #[test]
    fn spot_sphere_contains_cone() {
        for outer in [0.2f32, 0.6, 1.2, 1.5] {
            let light = GpuLightData::spot(Vec3::ZERO, -Vec3::Z, 4.0, Vec3::ONE, 1.0, outer * 0.5, outer);
            let (center, radius) = light_view_sphere(Mat4::IDENTITY, &light);
            let rim = Vec3::new(outer.sin(), 0.0, -outer.cos()) * 4.0;
            assert!(center.distance(Vec3::ZERO) <= radius + 1e-4);
            assert!(center.distance(rim) <= radius + 1e-4);
            assert!(center.distance(-Vec3::Z * 4.0) <= radius + 1e-4);
        }
    }

    #[test]
    fn full_tiles_keep_first_lights() {
        let culler = culler();
        let lights: Vec<_> = (0..6)
            .map(|i| GpuLightData::point(Vec3::new(0.0, 0.0, -(i as f32)), 3.0, Vec3::ONE, 1.0))
            .collect();
        let lists = culler.cull(&lights, 4);
        let (tx, ty) = lists.grid().tile_at_pixel(64, 64);
        assert_eq!(lists.light_indices(tx, ty), &[0, 1, 2, 3]);
        assert_eq!(lists.as_words().len(), lists.grid().tile_count() as usize * 5);
    }
}
