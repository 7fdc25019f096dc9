//! Procedural sky drawn as a fullscreen triangle at the far plane

use crate::backend::*;
use glam::{Mat3, Mat4};

/// Depth-tested against the cleared far plane but never written, so any
/// geometry drawn afterwards lands in front of it.
pub fn create_skybox_pipeline<D: GpuDevice>(
    device: &mut D,
    color_format: TextureFormat,
) -> BackendResult<RenderPipelineId> {
    let uniforms = device.uniform_layout();
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("Skybox Pipeline".into()),
        shader: SKYBOX_SHADER.to_string(),
        vertex_layouts: Vec::new(),
        bind_group_layouts: vec![uniforms, uniforms],
        cull_mode: CullMode::None,
        depth_stencil: Some(DepthStencilState {
            format: TextureFormat::Depth32Float,
            depth_write_enabled: false,
            depth_compare: CompareFunction::LessEqual,
        }),
        color_format,
    })
}

/// Inverse of the projection times the rotation part of `view`
pub fn sky_inverse_view_proj(view: Mat4, proj: Mat4) -> Mat4 {
    let rotation = Mat4::from_mat3(Mat3::from_mat4(view));
    (proj * rotation).inverse()
}

pub const SKYBOX_SHADER: &str = r#"
struct EnvironmentData {
    zenith: vec4<f32>,
    horizon: vec4<f32>,
    ground: vec4<f32>,
}

struct SkyUniforms {
    inv_view_proj: mat4x4<f32>,
    environment: EnvironmentData,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
}

@group(1) @binding(0) var<uniform> sky: SkyUniforms;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    let ndc = uv * 2.0 - 1.0;
    var output: VertexOutput;
    output.clip_position = vec4<f32>(ndc, 1.0, 1.0);
    output.ndc = ndc;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let far = sky.inv_view_proj * vec4<f32>(input.ndc, 1.0, 1.0);
    let direction = normalize(far.xyz / far.w);
    let env = sky.environment;
    var color: vec3<f32>;
    if direction.y >= 0.0 {
        color = mix(env.horizon.xyz, env.zenith.xyz, pow(direction.y, 0.6));
    } else {
        color = mix(env.horizon.xyz, env.ground.xyz, pow(-direction.y, 0.4));
    }
    color = color * env.zenith.w;
    color = color / (color + vec3<f32>(1.0));
    return vec4<f32>(color, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};

    #[test]
    fn sky_direction_ignores_translation() {
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let a = Mat4::look_to_rh(Vec3::ZERO, -Vec3::Z, Vec3::Y);
        let b = Mat4::look_to_rh(Vec3::new(10.0, 5.0, 3.0), -Vec3::Z, Vec3::Y);
        let center = |m: Mat4| {
            let p = sky_inverse_view_proj(m, proj) * Vec4::new(0.0, 0.0, 1.0, 1.0);
            (p.truncate() / p.w).normalize()
        };
        assert!(center(a).abs_diff_eq(-Vec3::Z, 1e-4));
        assert!(center(a).abs_diff_eq(center(b), 1e-4));
    }
}
