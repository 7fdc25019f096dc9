//! Forward+ shading pipeline

use crate::backend::*;

/// Layout of group 3: base color texture and its sampler
pub fn material_texture_layout<D: GpuDevice>(device: &mut D) -> BackendResult<BindGroupLayoutId> {
    device.create_bind_group_layout(&[
        BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture,
        },
        BindGroupLayoutEntry {
            binding: 1,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Sampler,
        },
    ])
}

/// Groups: 0 frame uniforms, 1 draw uniforms, 2 lights + tile lists,
/// 3 material texture.
pub fn create_forward_pipeline<D: GpuDevice>(
    device: &mut D,
    color_format: TextureFormat,
    light_layout: BindGroupLayoutId,
    texture_layout: BindGroupLayoutId,
) -> BackendResult<RenderPipelineId> {
    let uniforms = device.uniform_layout();
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("Forward+ Pipeline".into()),
        shader: FORWARD_PLUS_SHADER.to_string(),
        vertex_layouts: vec![Vertex::layout()],
        bind_group_layouts: vec![uniforms, uniforms, light_layout, texture_layout],
        cull_mode: CullMode::Back,
        depth_stencil: Some(DepthStencilState {
            format: TextureFormat::Depth32Float,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
        }),
        color_format,
    })
}

pub const FORWARD_PLUS_SHADER: &str = r#"
struct EnvironmentData {
    zenith: vec4<f32>,
    horizon: vec4<f32>,
    ground: vec4<f32>,
}

struct FrameUniforms {
    view: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    ambient: vec4<f32>,
    directional_direction: vec4<f32>,
    directional_color: vec4<f32>,
    tile_info: vec4<u32>,
    environment: EnvironmentData,
}

struct MaterialData {
    base_color: vec4<f32>,
    emissive: vec4<f32>,
    params: vec4<f32>,
}

struct DrawUniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    material: MaterialData,
}

struct Light {
    position_range: vec4<f32>,
    color_intensity: vec4<f32>,
    direction_type: vec4<f32>,
    spot_params: vec4<f32>,
}

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@group(0) @binding(0) var<uniform> frame: FrameUniforms;
@group(1) @binding(0) var<uniform> draw: DrawUniforms;
@group(2) @binding(0) var<storage, read> lights: array<Light>;
@group(2) @binding(1) var<storage, read> tiles: array<u32>;
@group(3) @binding(0) var base_texture: texture_2d<f32>;
@group(3) @binding(1) var base_sampler: sampler;

const PI: f32 = 3.14159265359;

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    let world_pos = draw.model * vec4<f32>(input.position, 1.0);
    output.world_position = world_pos.xyz;
    output.clip_position = draw.view_proj * world_pos;
    output.world_normal = normalize((draw.normal_matrix * vec4<f32>(input.normal, 0.0)).xyz);
    output.uv = input.uv;
    return output;
}

fn sky(direction: vec3<f32>) -> vec3<f32> {
    let env = frame.environment;
    let y = normalize(direction).y;
    var color: vec3<f32>;
    if y >= 0.0 {
        color = mix(env.horizon.xyz, env.zenith.xyz, pow(y, 0.6));
    } else {
        color = mix(env.horizon.xyz, env.ground.xyz, pow(-y, 0.4));
    }
    return color * env.zenith.w;
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * d * d);
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let k = (roughness + 1.0) * (roughness + 1.0) / 8.0;
    let gv = n_dot_v / (n_dot_v * (1.0 - k) + k);
    let gl = n_dot_l / (n_dot_l * (1.0 - k) + k);
    return gv * gl;
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (1.0 - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

fn shade(n: vec3<f32>, v: vec3<f32>, l: vec3<f32>, radiance: vec3<f32>, albedo: vec3<f32>, metallic: f32, roughness: f32, f0: vec3<f32>) -> vec3<f32> {
    let h = normalize(v + l);
    let n_dot_l = max(dot(n, l), 0.0);
    let n_dot_v = max(dot(n, v), 0.0001);
    let f = fresnel_schlick(max(dot(h, v), 0.0), f0);
    let specular = distribution_ggx(max(dot(n, h), 0.0), roughness)
        * geometry_smith(n_dot_v, n_dot_l, roughness) * f
        / (4.0 * n_dot_v * n_dot_l + 0.0001);
    let kd = (vec3<f32>(1.0) - f) * (1.0 - metallic);
    return (kd * albedo / PI + specular) * radiance * n_dot_l;
}

fn attenuation(distance: f32, range: f32) -> f32 {
    let ratio = distance / max(range, 0.0001);
    let window = clamp(1.0 - ratio * ratio * ratio * ratio, 0.0, 1.0);
    return window * window / (distance * distance + 1.0);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let material = draw.material;
    var base = material.base_color;
    if material.params.z > 0.5 {
        base = base * textureSample(base_texture, base_sampler, input.uv);
    }
    let albedo = base.rgb;
    let metallic = clamp(material.params.x, 0.0, 1.0);
    let roughness = clamp(material.params.y, 0.04, 1.0);
    let f0 = mix(vec3<f32>(0.04), albedo, metallic);

    let n = normalize(input.world_normal);
    let v = normalize(frame.camera_position.xyz - input.world_position);
    var lo = vec3<f32>(0.0);

    if frame.directional_direction.w > 0.5 {
        let l = normalize(-frame.directional_direction.xyz);
        let radiance = frame.directional_color.rgb * frame.directional_color.w;
        lo += shade(n, v, l, radiance, albedo, metallic, roughness, f0);
    }

    if frame.tile_info.w == 1u {
        let tile_size = max(frame.tile_info.y, 1u);
        let tile_x = u32(input.clip_position.x) / tile_size;
        let tile_y = u32(input.clip_position.y) / tile_size;
        let base_index = (tile_y * frame.tile_info.x + tile_x) * frame.tile_info.z;
        let count = tiles[base_index];
        for (var i = 0u; i < count; i = i + 1u) {
            let light = lights[tiles[base_index + 1u + i]];
            let to_light = light.position_range.xyz - input.world_position;
            let distance = length(to_light);
            if distance >= light.position_range.w {
                continue;
            }
            let l = to_light / max(distance, 0.0001);
            var falloff = attenuation(distance, light.position_range.w);
            if light.direction_type.w > 0.5 {
                let cos_angle = dot(-l, normalize(light.direction_type.xyz));
                falloff *= smoothstep(light.spot_params.y, light.spot_params.x, cos_angle);
            }
            let radiance = light.color_intensity.rgb * light.color_intensity.w * falloff;
            lo += shade(n, v, l, radiance, albedo, metallic, roughness, f0);
        }
    }

    let irradiance = sky(n);
    let ambient = (frame.ambient.rgb * frame.ambient.w + irradiance * 0.25) * albedo * (1.0 - metallic * 0.5);
    let emissive = material.emissive.rgb * material.emissive.w;
    var color = ambient + lo + emissive;
    color = color / (color + vec3<f32>(1.0));
    return vec4<f32>(color, base.a);
}
"#;
