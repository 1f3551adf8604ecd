//! Minimal smoke-test shader
//!
//! A viewport transform with a pass-through texture coordinate, and a
//! fragment stage that samples a single texture. It is never drawn with;
//! linking it only proves the shader compiler works.

/// A program the probe asks the context to compile and link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderProgram {
    pub label: &'static str,
    pub source: &'static str,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
}

pub const SMOKE_PROGRAM: ShaderProgram = ShaderProgram {
    label: "Capability Probe Shader",
    source: SMOKE_SHADER,
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
};

const SMOKE_SHADER: &str = r#"
struct Viewport {
    transform: mat4x4<f32>,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@group(0) @binding(0) var<uniform> viewport: Viewport;
@group(0) @binding(1) var source_texture: texture_2d<f32>;
@group(0) @binding(2) var source_sampler: sampler;

@vertex
fn vs_main(
    @location(0) position: vec2<f32>,
    @location(1) tex_coord: vec2<f32>,
) -> VertexOutput {
    var out: VertexOutput;
    out.position = viewport.transform * vec4<f32>(position, 0.0, 1.0);
    out.tex_coord = tex_coord;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(source_texture, source_sampler, in.tex_coord);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_points_exist_in_source() {
        assert!(SMOKE_PROGRAM
            .source
            .contains(&format!("fn {}(", SMOKE_PROGRAM.vertex_entry)));
        assert!(SMOKE_PROGRAM
            .source
            .contains(&format!("fn {}(", SMOKE_PROGRAM.fragment_entry)));
    }
}
