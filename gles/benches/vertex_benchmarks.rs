use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_gles::format::{FormatCaps, FormatKey, lookup};
use redlilium_gles::{
    AttributeDescriptor, ComponentType, CurrentValues, DeviceConfig, GlesDevice, PrimitiveMode,
    ShaderAttribute, ShaderInputType, ShaderProgram, UsageHint, VertexArray,
};

const VERTICES: u32 = 4096;

fn program(locations: u32) -> ShaderProgram {
    (0..locations).fold(ShaderProgram::new(), |program, location| {
        program.with_attribute(ShaderAttribute::new(
            format!("a_input{location}"),
            location,
            ShaderInputType::Float,
        ))
    })
}

fn device() -> Arc<GlesDevice> {
    GlesDevice::new(DeviceConfig::default()).expect("dummy device")
}

// ---------------------------------------------------------------------------
// Format conversion
// ---------------------------------------------------------------------------

fn bench_convert(c: &mut Criterion, name: &str, key: FormatKey) {
    let descriptor = lookup(key, &FormatCaps::default()).expect("supported format");
    let stride = key.component_type.size() as usize * key.size as usize;
    let input = vec![0x5au8; stride * VERTICES as usize];
    let mut output = vec![0u8; descriptor.output_element_size() as usize * VERTICES as usize];

    c.bench_function(name, |b| {
        b.iter(|| {
            descriptor.convert(black_box(&input), stride, VERTICES as usize, &mut output);
            black_box(&output);
        });
    });
}

fn bench_format_conversion(c: &mut Criterion) {
    bench_convert(
        c,
        "convert_4096_ubyte3_normalized",
        FormatKey::new(ComponentType::UnsignedByte, 3, true, false),
    );
    bench_convert(
        c,
        "convert_4096_short3_to_float",
        FormatKey::new(ComponentType::Short, 3, false, false),
    );
    bench_convert(
        c,
        "convert_4096_fixed4_to_float",
        FormatKey::new(ComponentType::Fixed, 4, false, false),
    );
    bench_convert(
        c,
        "convert_4096_float4_copy",
        FormatKey::new(ComponentType::Float, 4, false, false),
    );
}

// ---------------------------------------------------------------------------
// Vertex data preparation
// ---------------------------------------------------------------------------

fn bench_prepare_static(c: &mut Criterion) {
    let device = device();
    let positions = device.create_source_buffer(vec![0u8; 6 * VERTICES as usize], UsageHint::Static);
    let normals = device.create_source_buffer(vec![0u8; 16 * VERTICES as usize], UsageHint::Static);

    let mut vao = VertexArray::new();
    vao.attribute_pointer(0, 3, ComponentType::Short, true, 0, positions, 0).unwrap();
    vao.attribute_pointer(1, 4, ComponentType::Float, false, 0, normals, 0).unwrap();
    vao.set_enabled(0, true).unwrap();
    vao.set_enabled(1, true).unwrap();

    let values = CurrentValues::new();
    let program = program(3);
    let mut manager = device.create_vertex_data_manager().unwrap();

    c.bench_function("prepare_static_and_direct_4096", |b| {
        b.iter(|| {
            let translated = manager
                .prepare_vertex_data(vao.attributes(), values.as_slice(), &program, 0, VERTICES, 0)
                .unwrap();
            black_box(translated);
        });
    });
}

fn bench_prepare_dynamic(c: &mut Criterion) {
    let device = device();
    let data: Arc<[u8]> = Arc::from(vec![0u8; 12 * VERTICES as usize]);
    let attributes: Vec<AttributeDescriptor> = (0..4)
        .map(|_| AttributeDescriptor {
            component_type: ComponentType::Float,
            size: 3,
            client_data: Some(data.clone()),
            enabled: true,
            ..Default::default()
        })
        .collect();
    let program = program(4);
    let mut manager = device.create_vertex_data_manager().unwrap();

    c.bench_function("prepare_dynamic_4_attributes_4096", |b| {
        b.iter(|| {
            let translated = manager
                .prepare_vertex_data(&attributes, &[], &program, 0, VERTICES, 0)
                .unwrap();
            black_box(translated);
        });
    });
}

// ---------------------------------------------------------------------------
// Input layout cache
// ---------------------------------------------------------------------------

fn bench_input_layout_hit(c: &mut Criterion) {
    let device = device();
    let source = device.create_source_buffer(vec![0u8; 64], UsageHint::Static);
    let mut vao = VertexArray::new();
    for index in 0..4 {
        vao.attribute_pointer(index, 4, ComponentType::Float, false, 0, source.clone(), 0)
            .unwrap();
        vao.set_enabled(index, true).unwrap();
    }
    let program = program(4);
    let mut manager = device.create_vertex_data_manager().unwrap();
    let mut cache = device.create_input_layout_cache();
    let translated = manager
        .prepare_vertex_data(vao.attributes(), &[], &program, 0, 4, 0)
        .unwrap();

    c.bench_function("input_layout_apply_cached", |b| {
        b.iter(|| {
            cache
                .apply_vertex_buffers(black_box(&translated), PrimitiveMode::Triangles, &program)
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_format_conversion,
    bench_prepare_static,
    bench_prepare_dynamic,
    bench_input_layout_hit,
);
criterion_main!(benches);
