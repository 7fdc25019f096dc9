//! CPU-side mesh data and primitive generators

use crate::backend::types::Vertex;
use glam::{Vec2, Vec3, Vec4};
use std::f32::consts::{PI, TAU};

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn from_parts(name: &str, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            name: name.to_string(),
            vertices,
            indices,
        }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Local-space bounding sphere as (center, radius)
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        let Some(first) = self.vertices.first() else {
            return (Vec3::ZERO, 0.0);
        };
        let (min, max) = self
            .vertices
            .iter()
            .fold((first.position, first.position), |(lo, hi), v| {
                (lo.min(v.position), hi.max(v.position))
            });
        let center = (min + max) * 0.5;
        let radius = self
            .vertices
            .iter()
            .map(|v| v.position.distance(center))
            .fold(0.0, f32::max);
        (center, radius)
    }

    /// Append a quad `a b c d` (counter-clockwise seen from `normal`).
    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3, tangent: Vec3) {
        let base = self.vertices.len() as u32;
        let uvs = [
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];
        for (position, uv) in corners.into_iter().zip(uvs) {
            self.vertices.push(Vertex {
                position,
                normal,
                uv,
                tangent: tangent.extend(1.0),
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Unit cube centered at the origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");
        // (normal, tangent) per face; bitangent = normal x tangent
        let faces = [
            (Vec3::Z, Vec3::X),
            (-Vec3::Z, -Vec3::X),
            (Vec3::X, -Vec3::Z),
            (-Vec3::X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (-Vec3::Y, Vec3::X),
        ];
        for (normal, tangent) in faces {
            let bitangent = normal.cross(tangent);
            let center = normal * 0.5;
            let (t, b) = (tangent * 0.5, bitangent * 0.5);
            mesh.push_quad(
                [center - t - b, center + t - b, center + t + b, center - t + b],
                normal,
                tangent,
            );
        }
        mesh
    }

    /// UV sphere of radius 0.5
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = Mesh::new("sphere");

        for ring in 0..=rings {
            let phi = ring as f32 / rings as f32 * PI;
            for segment in 0..=segments {
                let theta = segment as f32 / segments as f32 * TAU;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                mesh.vertices.push(Vertex {
                    position: normal * 0.5,
                    normal,
                    uv: Vec2::new(segment as f32 / segments as f32, ring as f32 / rings as f32),
                    tangent: Vec4::new(-theta.sin(), 0.0, theta.cos(), 1.0),
                });
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                mesh.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        mesh
    }

    /// Plane on XZ facing +Y
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let n = subdivisions.max(1);
        let mut mesh = Mesh::new("plane");

        for z in 0..=n {
            for x in 0..=n {
                let u = x as f32 / n as f32;
                let v = z as f32 / n as f32;
                mesh.vertices.push(Vertex {
                    position: Vec3::new((u - 0.5) * width, 0.0, (v - 0.5) * depth),
                    normal: Vec3::Y,
                    uv: Vec2::new(u, v),
                    tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
                });
            }
        }

        let stride = n + 1;
        for z in 0..n {
            for x in 0..n {
                let a = z * stride + x;
                let b = a + stride;
                mesh.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_faces_wind_outward() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        for tri in cube.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| cube.vertices[i as usize]);
            let face_normal = (b.position - a.position).cross(c.position - a.position);
            assert!(face_normal.dot(a.normal) > 0.0);
        }
    }

    #[test]
    fn sphere_bounds() {
        let sphere = Mesh::sphere(16, 8);
        let (center, radius) = sphere.bounding_sphere();
        assert!(center.abs_diff_eq(Vec3::ZERO, 1e-5));
        assert!((radius - 0.5).abs() < 1e-4);
        assert!(sphere.indices.iter().all(|i| (*i as usize) < sphere.vertices.len()));
    }

    #[test]
    fn plane_faces_up() {
        let plane = Mesh::plane(2.0, 2.0, 2);
        assert_eq!(plane.vertices.len(), 9);
        let tri = &plane.indices[0..3];
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| plane.vertices[i as usize].position);
        assert!((b - a).cross(c - a).y > 0.0);
    }
}
