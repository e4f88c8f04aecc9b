//! Renderer lifecycle tests against the dummy device.
//!
//! A fake surface hands the renderer fabricated command buffers; the dummy
//! device records every resource event and command so each test can check
//! what the renderer created, recorded and released.

mod common;

use ash::vk;
use rstest::rstest;

use common::{
    BrokenShaders, EMPTY_SCENE_GLTF, FakeSurface, StaticAsset, StaticShaders,
    interleaved_quad_glb, quad_mesh,
};
use mesh_viewer::backend::dummy::{Command, DeviceEvent, FailurePoint};
use mesh_viewer::backend::DrawIndexed;
use mesh_viewer::camera;
use mesh_viewer::error::{AssetLoadError, DeviceError, SurfaceStateError};
use mesh_viewer::frame::FrameUniformBlock;
use mesh_viewer::{
    FixedCamera, FrameOutcome, FrameState, GltfAsset, Renderer, RendererConfig, RendererError,
};

fn init(surface: &FakeSurface) -> Result<Renderer, RendererError> {
    Renderer::initialize(
        surface,
        &StaticAsset(quad_mesh()),
        &StaticShaders,
        Box::new(FixedCamera),
        RendererConfig::default(),
    )
}

fn quad_draw() -> DrawIndexed {
    DrawIndexed {
        index_count: 6,
        instance_count: 1,
        first_index: 0,
        vertex_offset: 0,
        first_instance: 0,
    }
}

// ============================================================================
// Initialization
// ============================================================================

#[test]
fn test_quad_layout_is_packed_back_to_back() {
    let surface = FakeSurface::new(2);
    let renderer = init(&surface).unwrap();

    let plan = renderer.buffers().plan();
    assert_eq!(plan.attribute_offsets(), vec![0, 48, 96, 128]);
    assert_eq!(plan.index().offset, 192);
    assert_eq!(plan.index().size, 12);
    assert_eq!(plan.total_size(), 204);
    assert_eq!(renderer.buffers().index_count(), 6);
    assert_eq!(renderer.buffers().index_type(), vk::IndexType::UINT16);
    assert_eq!(renderer.frame_state(), FrameState::Idle);

    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_uploaded_bytes_match_streams() {
    let surface = FakeSurface::new(2);
    let renderer = init(&surface).unwrap();
    let mesh = quad_mesh();

    let contents = surface
        .dummy()
        .buffer_contents(renderer.buffers().buffer())
        .unwrap();
    assert_eq!(contents.len(), 204);

    let plan = renderer.buffers().plan();
    for (stream, region) in mesh.attributes.iter().zip(plan.attributes()) {
        let start = region.offset as usize;
        assert_eq!(&contents[start..start + region.size as usize], stream.bytes());
    }
    assert_eq!(&contents[192..204], mesh.indices.bytes());

    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_every_mapping_is_released() {
    let surface = FakeSurface::new(3);
    let mut renderer = init(&surface).unwrap();
    renderer.render_frame(&surface).unwrap();

    let dummy = surface.dummy();
    assert!(dummy.map_count() > 0);
    assert_eq!(dummy.map_count(), dummy.unmap_count());
    assert!(!dummy.is_mapped(renderer.frame_resources().uniform_buffer(0).unwrap().memory));

    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_pipeline_uses_surface_render_pass() {
    let surface = FakeSurface::new(2);
    let renderer = init(&surface).unwrap();

    let pipelines = surface.dummy().pipelines();
    assert_eq!(pipelines.len(), 1);
    let (handle, state, render_pass) = &pipelines[0];
    assert_eq!(*handle, renderer.pipeline());
    assert_eq!(*render_pass, surface.render_pass_handle());
    assert_eq!(state.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
    assert_eq!(state.cull_mode, vk::CullModeFlags::BACK);
    assert_eq!(state.front_face, vk::FrontFace::COUNTER_CLOCKWISE);

    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_descriptor_sets_point_at_their_own_buffers() {
    let surface = FakeSurface::new(3);
    let renderer = init(&surface).unwrap();

    let writes = surface.dummy().descriptor_writes();
    assert_eq!(writes.len(), 3);
    for (i, write) in writes.iter().enumerate() {
        let frames = renderer.frame_resources();
        assert_eq!(write.set, frames.descriptor_set(i as u32).unwrap());
        assert_eq!(write.buffer, frames.uniform_buffer(i as u32).unwrap().buffer);
        assert_eq!(write.range, FrameUniformBlock::SIZE);
    }

    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_gltf_without_meshes_creates_nothing() {
    let surface = FakeSurface::new(2);
    let asset = GltfAsset::from_slice(EMPTY_SCENE_GLTF.as_bytes().to_vec());

    let result = Renderer::initialize(
        &surface,
        &asset,
        &StaticShaders,
        Box::new(FixedCamera),
        RendererConfig::default(),
    );

    assert!(matches!(
        result,
        Err(RendererError::AssetLoad(AssetLoadError::NoMeshes))
    ));
    assert!(surface.dummy().events().is_empty());
}

#[test]
fn test_interleaved_gltf_keeps_source_stride() {
    let surface = FakeSurface::new(2);
    let (glb, vertices) = interleaved_quad_glb();
    let asset = GltfAsset::from_slice(glb);

    let mut renderer = Renderer::initialize(
        &surface,
        &asset,
        &StaticShaders,
        Box::new(FixedCamera),
        RendererConfig::default(),
    )
    .unwrap();

    // Each span ends one element past the last 48-byte step.
    let plan = renderer.buffers().plan();
    let offsets = plan.attribute_offsets();
    assert_eq!(offsets, vec![0, 156, 312, 464]);
    assert_eq!(plan.index().offset, 624);
    assert_eq!(plan.index().size, 12);
    assert_eq!(plan.total_size(), 636);

    let pipelines = surface.dummy().pipelines();
    let strides: Vec<u32> = pipelines[0].1.bindings.iter().map(|b| b.stride).collect();
    assert_eq!(strides, vec![48; 4]);

    // (first float within a vertex, floats per element)
    let spans = [(0, 3), (3, 3), (6, 2), (8, 4)];
    let contents = surface
        .dummy()
        .buffer_contents(renderer.buffers().buffer())
        .unwrap();
    for (a, (first, width)) in spans.into_iter().enumerate() {
        for (v, vertex) in vertices.iter().enumerate() {
            let at = offsets[a] as usize + v * 48;
            let expected: &[u8] = bytemuck::cast_slice(&vertex[first..first + width]);
            assert_eq!(&contents[at..at + expected.len()], expected, "attribute {a} vertex {v}");
        }
    }
    let index_at = plan.index().offset as usize;
    assert_eq!(
        &contents[index_at..index_at + 12],
        bytemuck::cast_slice::<u16, u8>(&[0, 1, 2, 2, 3, 0])
    );

    let outcome = renderer.render_frame(&surface).unwrap();
    assert_eq!(outcome, FrameOutcome::Drawn(quad_draw()));

    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_shader_failure_creates_nothing() {
    let surface = FakeSurface::new(2);

    let result = Renderer::initialize(
        &surface,
        &StaticAsset(quad_mesh()),
        &BrokenShaders,
        Box::new(FixedCamera),
        RendererConfig::default(),
    );

    assert!(matches!(result, Err(RendererError::ShaderCompile(_))));
    assert!(surface.dummy().events().is_empty());
}

#[rstest]
#[case::buffer(FailurePoint::CreateBuffer)]
#[case::map(FailurePoint::MapMemory)]
#[case::set_layout(FailurePoint::DescriptorSetLayout)]
#[case::descriptor_pool(FailurePoint::DescriptorPool)]
#[case::descriptor_sets(FailurePoint::DescriptorSets)]
#[case::shader_module(FailurePoint::ShaderModule)]
#[case::pipeline_layout(FailurePoint::PipelineLayout)]
#[case::pipeline(FailurePoint::GraphicsPipeline)]
fn test_failed_initialization_releases_everything(#[case] point: FailurePoint) {
    let surface = FakeSurface::new(3);
    surface.dummy().fail_on(point);

    let result = init(&surface);

    assert!(result.is_err(), "{:?} should fail initialization", point);
    assert!(
        surface.dummy().live_resources().is_empty(),
        "leaked after {:?}: {:?}",
        point,
        surface.dummy().live_resources()
    );
    assert_eq!(surface.dummy().map_count(), surface.dummy().unmap_count());
}

// ============================================================================
// Frames
// ============================================================================

#[test]
fn test_frame_records_single_indexed_draw() {
    let surface = FakeSurface::new(2);
    let mut renderer = init(&surface).unwrap();

    let outcome = renderer.render_frame(&surface).unwrap();
    assert_eq!(outcome, FrameOutcome::Drawn(quad_draw()));

    let cmd = FakeSurface::command_buffer_for(0);
    let buffer = renderer.buffers().buffer();
    let commands = surface.dummy().commands(cmd);
    assert_eq!(commands.len(), 7);
    assert_eq!(
        commands[0],
        Command::SetViewport {
            x: 0.0,
            y: 0.0,
            width: 800.0,
            height: 600.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    );
    assert_eq!(
        commands[1],
        Command::SetScissor {
            x: 0,
            y: 0,
            width: 800,
            height: 600,
        }
    );
    assert_eq!(commands[2], Command::BindPipeline(renderer.pipeline()));
    assert!(matches!(
        commands[3],
        Command::BindDescriptorSet { set, .. }
            if set == renderer.frame_resources().descriptor_set(0).unwrap()
    ));
    assert_eq!(
        commands[4],
        Command::BindVertexBuffers {
            first_binding: 0,
            buffers: vec![buffer; 4],
            offsets: vec![0, 48, 96, 128],
        }
    );
    assert_eq!(
        commands[5],
        Command::BindIndexBuffer {
            buffer,
            offset: 192,
            index_type: vk::IndexType::UINT16,
        }
    );
    assert_eq!(commands[6], Command::DrawIndexed(quad_draw()));

    assert_eq!(
        renderer.frame_state(),
        FrameState::Drawn {
            image_index: 0,
            command_buffer: cmd,
        }
    );

    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_resize_changes_viewport_not_pipeline() {
    let mut surface = FakeSurface::new(2);
    let mut renderer = init(&surface).unwrap();
    let pipeline = renderer.pipeline();

    renderer.render_frame(&surface).unwrap();
    surface.dummy().clear_commands();
    surface.resize(1024, 768);
    renderer.render_frame(&surface).unwrap();

    let commands = surface.dummy().commands(FakeSurface::command_buffer_for(0));
    assert!(matches!(
        commands[0],
        Command::SetViewport { width, height, .. } if width == 1024.0 && height == 768.0
    ));
    assert!(matches!(
        commands[1],
        Command::SetScissor {
            width: 1024,
            height: 768,
            ..
        }
    ));
    assert_eq!(commands[2], Command::BindPipeline(pipeline));
    assert_eq!(surface.dummy().pipelines().len(), 1);

    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_uniforms_hold_view_and_projection() {
    let surface = FakeSurface::new(2);
    let mut renderer = init(&surface).unwrap();
    renderer.render_frame(&surface).unwrap();

    let config = RendererConfig::default();
    let expected = FrameUniformBlock::new(
        camera::initial_view(&config),
        camera::projection(&config, 800.0 / 600.0),
    );
    let uniforms = renderer.frame_resources().uniform_buffer(0).unwrap();
    let contents = surface.dummy().buffer_contents(uniforms.buffer).unwrap();
    assert_eq!(contents, bytemuck::bytes_of(&expected));

    // Same camera, same image: same bytes.
    renderer.render_frame(&surface).unwrap();
    assert_eq!(
        surface.dummy().buffer_contents(uniforms.buffer).unwrap(),
        bytemuck::bytes_of(&expected)
    );

    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_uniform_update_touches_only_current_image() {
    let mut surface = FakeSurface::new(3);
    let mut renderer = init(&surface).unwrap();
    surface.set_current_image(Some(1));

    renderer.render_frame(&surface).unwrap();

    let frames = renderer.frame_resources();
    let contents = |i: u32| {
        surface
            .dummy()
            .buffer_contents(frames.uniform_buffer(i).unwrap().buffer)
            .unwrap()
    };
    let zeroed = vec![0u8; FrameUniformBlock::SIZE as usize];
    assert_eq!(contents(0), zeroed);
    assert_ne!(contents(1), zeroed);
    assert_eq!(contents(2), zeroed);
    assert!(
        surface
            .dummy()
            .commands(FakeSurface::command_buffer_for(0))
            .is_empty()
    );
    assert_eq!(
        surface
            .dummy()
            .commands(FakeSurface::command_buffer_for(1))
            .len(),
        7
    );

    renderer.shutdown(&surface).unwrap();
}

#[rstest]
#[case::no_image(false, None, true, SurfaceStateError::NoCurrentImage)]
#[case::no_command_buffer(false, Some(0), false, SurfaceStateError::NoCommandBuffer(0))]
#[case::out_of_range(false, Some(5), true, SurfaceStateError::ImageOutOfRange { index: 5, count: 2 })]
#[case::minimized(true, Some(0), true, SurfaceStateError::ZeroExtent)]
fn test_unavailable_frame_is_skipped(
    #[case] minimized: bool,
    #[case] image: Option<u32>,
    #[case] command_buffers: bool,
    #[case] expected: SurfaceStateError,
) {
    let mut surface = FakeSurface::new(2);
    let mut renderer = init(&surface).unwrap();
    let maps_before = surface.dummy().map_count();

    if minimized {
        surface.resize(0, 0);
    }
    surface.set_current_image(image);
    surface.set_command_buffers_available(command_buffers);

    let outcome = renderer.render_frame(&surface).unwrap();

    assert_eq!(outcome, FrameOutcome::Skipped(expected));
    assert_eq!(renderer.frame_state(), FrameState::Idle);
    for i in 0..6 {
        assert!(
            surface
                .dummy()
                .commands(FakeSurface::command_buffer_for(i))
                .is_empty()
        );
    }
    assert_eq!(surface.dummy().map_count(), maps_before);

    // The next healthy frame draws normally.
    surface.resize(800, 600);
    surface.set_current_image(Some(0));
    surface.set_command_buffers_available(true);
    assert_eq!(
        renderer.render_frame(&surface).unwrap(),
        FrameOutcome::Drawn(quad_draw())
    );

    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_failed_uniform_write_is_fatal() {
    let surface = FakeSurface::new(2);
    let mut renderer = init(&surface).unwrap();
    surface.dummy().fail_on(FailurePoint::MapMemory);

    let result = renderer.render_frame(&surface);

    assert!(matches!(result, Err(RendererError::Allocation(_))));
    assert_eq!(renderer.frame_state(), FrameState::Idle);
    assert!(
        !surface
            .dummy()
            .commands(FakeSurface::command_buffer_for(0))
            .contains(&Command::DrawIndexed(quad_draw()))
    );

    surface.dummy().clear_failure(FailurePoint::MapMemory);
    renderer.shutdown(&surface).unwrap();
}

// ============================================================================
// Presenting
// ============================================================================

const CLEAR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

#[test]
fn test_presented_frame_is_ended_once() {
    let mut surface = FakeSurface::new(2);
    let mut renderer = init(&surface).unwrap();

    let outcome = renderer.present_frame(&mut surface, CLEAR, 1.0).unwrap();

    assert_eq!(outcome, Some(FrameOutcome::Drawn(quad_draw())));
    assert_eq!(surface.frames_begun(), 1);
    assert_eq!(surface.frames_ended(), 1);
    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_failed_submit_is_fatal() {
    let mut surface = FakeSurface::new(2);
    let mut renderer = init(&surface).unwrap();
    surface.fail_submit(vk::Result::ERROR_DEVICE_LOST);

    let err = renderer
        .present_frame(&mut surface, CLEAR, 1.0)
        .unwrap_err();

    assert!(matches!(
        err,
        RendererError::Device(DeviceError::Submit(vk::Result::ERROR_DEVICE_LOST))
    ));
    assert!(!err.is_transient());
    assert_eq!(surface.frames_ended(), 1);

    // The caller still shuts down cleanly after a fatal frame.
    renderer.shutdown(&surface).unwrap();
    assert!(surface.dummy().live_resources().is_empty());
}

#[test]
fn test_unacquired_frame_is_not_ended() {
    let mut surface = FakeSurface::new(2);
    let mut renderer = init(&surface).unwrap();
    surface.set_current_image(None);

    let outcome = renderer.present_frame(&mut surface, CLEAR, 1.0).unwrap();

    assert_eq!(outcome, None);
    assert_eq!(surface.frames_begun(), 0);
    assert_eq!(surface.frames_ended(), 0);
    assert!(surface
        .dummy()
        .commands(FakeSurface::command_buffer_for(0))
        .is_empty());
    renderer.shutdown(&surface).unwrap();
}

#[test]
fn test_skipped_recording_still_ends_frame() {
    let mut surface = FakeSurface::new(2);
    let mut renderer = init(&surface).unwrap();
    surface.set_command_buffers_available(false);

    let outcome = renderer.present_frame(&mut surface, CLEAR, 1.0).unwrap();

    assert_eq!(
        outcome,
        Some(FrameOutcome::Skipped(SurfaceStateError::NoCommandBuffer(0)))
    );
    assert_eq!(surface.frames_ended(), 1);
    assert_eq!(renderer.frame_state(), FrameState::Idle);
    renderer.shutdown(&surface).unwrap();
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_shutdown_waits_then_destroys_everything_once() {
    let surface = FakeSurface::new(3);
    let mut renderer = init(&surface).unwrap();
    renderer.render_frame(&surface).unwrap();

    let before = surface.dummy().events().len();
    renderer.shutdown(&surface).unwrap();

    let events = surface.dummy().events();
    let shutdown_events = &events[before..];
    assert_eq!(shutdown_events.first(), Some(&DeviceEvent::WaitIdle));
    assert!(shutdown_events[1..]
        .iter()
        .all(|event| matches!(event, DeviceEvent::Destroyed(_))));

    let dummy = surface.dummy();
    assert!(dummy.live_resources().is_empty());
    for event in &events {
        if let DeviceEvent::Created(resource) = event {
            assert_eq!(dummy.destroy_count(*resource), 1, "{:?}", resource);
        }
    }
}

#[test]
fn test_failed_wait_destroys_nothing() {
    let surface = FakeSurface::new(2);
    let renderer = init(&surface).unwrap();
    let live = surface.dummy().live_resources();
    let before = surface.dummy().events().len();
    surface.dummy().fail_on(FailurePoint::WaitIdle);

    let result = renderer.shutdown(&surface);

    assert!(matches!(
        result,
        Err(RendererError::Device(DeviceError::WaitIdle(_)))
    ));
    assert_eq!(surface.dummy().events().len(), before);
    assert_eq!(surface.dummy().live_resources(), live);
}

#[test]
fn test_drop_without_shutdown_leaves_resources_alone() {
    let surface = FakeSurface::new(2);
    let renderer = init(&surface).unwrap();
    let live = surface.dummy().live_resources();

    drop(renderer);

    assert_eq!(surface.dummy().live_resources(), live);
    assert!(!surface.dummy().events().contains(&DeviceEvent::WaitIdle));
}
