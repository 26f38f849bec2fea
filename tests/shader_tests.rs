use glam::Vec4;
use mesh_viewer::error::ShaderError;
use mesh_viewer::shader::{CompiledStage, ProgramLayout, Stage, UniformBlock};

const PLAIN_VS: &str = r#"
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 1.0);
}
"#;

const GLOBALS_VS: &str = r#"
struct Globals {
    mvp: mat4x4<f32>,
    tint: vec4<f32>,
}

@group(0) @binding(0) var<uniform> globals: Globals;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return globals.mvp * vec4<f32>(position, 1.0);
}
"#;

const GLOBALS_FS: &str = r#"
struct Globals {
    mvp: mat4x4<f32>,
    tint: vec4<f32>,
}

@group(0) @binding(0) var<uniform> globals: Globals;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return globals.tint;
}
"#;

fn compile_vs(source: &str) -> CompiledStage {
    CompiledStage::compile(Stage::Vertex, "test.vert", source).expect("vertex stage should compile")
}

fn compile_fs(source: &str) -> CompiledStage {
    CompiledStage::compile(Stage::Fragment, "test.frag", source)
        .expect("fragment stage should compile")
}

#[test]
fn valid_stage_compiles_and_finds_its_entry_point() {
    let stage = compile_vs(GLOBALS_VS);
    assert_eq!(stage.entry_point, "vs_main");
}

#[test]
fn syntax_error_surfaces_the_compiler_diagnostic() {
    let err = CompiledStage::compile(Stage::Fragment, "broken.frag", "@fragment fn fs_main( -> {")
        .unwrap_err();
    match err {
        ShaderError::Compile {
            stage, diagnostic, ..
        } => {
            assert_eq!(stage, Stage::Fragment);
            assert!(!diagnostic.is_empty());
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn validation_error_is_reported_as_a_compile_error() {
    // Parses fine, fails validation: a scalar is not a vec4 return value.
    let source = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return 1.0;
}
"#;
    let err = CompiledStage::compile(Stage::Fragment, "bad.frag", source).unwrap_err();
    assert!(matches!(err, ShaderError::Compile { .. }));
}

#[test]
fn missing_entry_point_is_rejected() {
    let err = CompiledStage::compile(Stage::Vertex, "no_entry.vert", GLOBALS_FS).unwrap_err();
    match err {
        ShaderError::Compile { diagnostic, .. } => {
            assert!(diagnostic.contains("entry point"), "diagnostic: {diagnostic}");
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn link_reflects_uniform_offsets_and_size() {
    let layout = ProgramLayout::link(&compile_vs(GLOBALS_VS), &compile_fs(GLOBALS_FS))
        .expect("matching stages should link");

    let uniforms = layout.uniforms.expect("both stages declare globals");
    let mvp = uniforms.slot("mvp").unwrap();
    assert_eq!((mvp.offset, mvp.size), (0, 64));
    let tint = uniforms.slot("tint").unwrap();
    assert_eq!((tint.offset, tint.size), (64, 16));
    assert_eq!(uniforms.size(), 80);
}

#[test]
fn nested_uniform_structs_flatten_to_dotted_names() {
    let source = r#"
struct Spot {
    position: vec3<f32>,
    cut_off: f32,
}

struct Globals {
    view: mat4x4<f32>,
    light: Spot,
}

@group(0) @binding(0) var<uniform> globals: Globals;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(globals.light.position, globals.light.cut_off);
}
"#;
    let layout = ProgramLayout::link(&compile_vs(PLAIN_VS), &compile_fs(source)).unwrap();

    let uniforms = layout.uniforms.expect("fragment stage declares globals");
    assert_eq!(uniforms.slot("view").unwrap().offset, 0);
    let position = uniforms.slot("light.position").unwrap();
    assert_eq!((position.offset, position.size), (64, 12));
    let cut_off = uniforms.slot("light.cut_off").unwrap();
    assert_eq!((cut_off.offset, cut_off.size), (76, 4));
}

#[test]
fn mismatched_uniform_structs_fail_to_link() {
    // Same members, different order, so every offset moves.
    let reordered_fs = r#"
struct Globals {
    tint: vec4<f32>,
    mvp: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> globals: Globals;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return globals.tint;
}
"#;
    let err = ProgramLayout::link(&compile_vs(GLOBALS_VS), &compile_fs(reordered_fs)).unwrap_err();
    match err {
        ShaderError::Link { message } => {
            assert!(message.contains("layout differs"), "message: {message}");
        }
        other => panic!("expected a link error, got {other:?}"),
    }
}

#[test]
fn fragment_only_uniforms_still_link() {
    let layout = ProgramLayout::link(&compile_vs(PLAIN_VS), &compile_fs(GLOBALS_FS)).unwrap();
    assert!(layout.uniforms.is_some());
}

#[test]
fn material_texture_outside_the_role_bindings_fails_to_link() {
    let source = r#"
@group(1) @binding(7) var stray: texture_2d<f32>;
@group(1) @binding(4) var material_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(stray, material_sampler, uv);
}
"#;
    let err = ProgramLayout::link(&compile_vs(PLAIN_VS), &compile_fs(source)).unwrap_err();
    match err {
        ShaderError::Link { message } => {
            assert!(message.contains("binding 7"), "message: {message}");
        }
        other => panic!("expected a link error, got {other:?}"),
    }
}

#[test]
fn sampler_at_the_wrong_binding_fails_to_link() {
    let source = r#"
@group(1) @binding(0) var diffuse_map: texture_2d<f32>;
@group(1) @binding(2) var material_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(diffuse_map, material_sampler, uv);
}
"#;
    let err = ProgramLayout::link(&compile_vs(PLAIN_VS), &compile_fs(source)).unwrap_err();
    assert!(matches!(err, ShaderError::Link { .. }));
}

#[test]
fn vertex_stage_material_bindings_fail_to_link() {
    let source = r#"
@group(1) @binding(0) var height_map: texture_2d<f32>;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    let lod = f32(textureNumLevels(height_map));
    return vec4<f32>(position, lod);
}
"#;
    let vs = compile_vs(source);
    let err = ProgramLayout::link(&vs, &compile_fs(GLOBALS_FS)).unwrap_err();
    match err {
        ShaderError::Link { message } => {
            assert!(message.contains("fragment-only"), "message: {message}");
        }
        other => panic!("expected a link error, got {other:?}"),
    }
}

#[test]
fn material_bindings_inside_the_convention_link() {
    let source = r#"
@group(1) @binding(0) var diffuse_map: texture_2d<f32>;
@group(1) @binding(1) var specular_map: texture_2d<f32>;
@group(1) @binding(4) var material_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let base = textureSample(diffuse_map, material_sampler, uv);
    let gloss = textureSample(specular_map, material_sampler, uv);
    return base + gloss;
}
"#;
    let layout = ProgramLayout::link(&compile_vs(PLAIN_VS), &compile_fs(source)).unwrap();
    // A material-sampling program with no uniform block at all is a valid
    // link result; the program still binds a (then empty) globals group.
    assert!(layout.uniforms.is_none());
    assert_eq!(layout.material.textures, vec![0, 1]);
    assert_eq!(layout.material.samplers, vec![4]);
}

#[test]
fn uniform_block_writes_known_names_and_ignores_the_rest() {
    let layout = ProgramLayout::link(&compile_vs(GLOBALS_VS), &compile_fs(GLOBALS_FS)).unwrap();
    let mut block = UniformBlock::new(layout.uniforms.unwrap());

    assert!(!block.take_dirty());
    assert!(block.set("tint", Vec4::new(1.0, 0.5, 0.25, 1.0)));
    assert!(block.take_dirty());
    assert!(!block.take_dirty());

    // Unknown name and wrong-size writes are ignored without poisoning
    // the buffer.
    assert!(!block.set("color", Vec4::ONE));
    assert!(!block.set("tint", 1.0f32));

    let bytes = &block.bytes()[64..80];
    let tint: &[f32] = bytemuck::cast_slice(bytes);
    assert_eq!(tint, &[1.0, 0.5, 0.25, 1.0]);
}

#[test]
fn shipped_shaders_compile_and_link() {
    let vs = CompiledStage::compile(
        Stage::Vertex,
        "model.vert.wgsl",
        include_str!("../shaders/model.vert.wgsl"),
    )
    .expect("shipped vertex shader should compile");
    let fs = CompiledStage::compile(
        Stage::Fragment,
        "model.frag.wgsl",
        include_str!("../shaders/model.frag.wgsl"),
    )
    .expect("shipped fragment shader should compile");

    let layout = ProgramLayout::link(&vs, &fs).expect("shipped shaders should link");

    let uniforms = layout.uniforms.expect("shipped shaders declare globals");
    assert!(uniforms.slot("model").is_some());
    // mat3x3<f32> columns have vec4 stride, matching the Mat3 host value.
    assert_eq!(uniforms.slot("normal_matrix").unwrap().size, 48);
    assert!(uniforms.slot("light.k_quadratic").is_some());
    assert_eq!(layout.material.textures, vec![0, 1]);
    assert_eq!(layout.material.samplers, vec![4]);
}
