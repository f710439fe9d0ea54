use std::time::Duration;

use feedback::gpu::{GpuContext, HeadlessRenderer};
use feedback::session::SessionRandomizer;
use feedback::{
    DeviceSize, EffectSelection, FeedbackPipeline, FrameInput, ParamSet, PipelineSettings, Pose,
    PoseSample, Preprocess, Shape, ShapeContent, Viewport,
};

const SIZE: u32 = 64;

fn headless() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(context) => Some(context),
        Err(err) => {
            eprintln!("Skipping test: no GPU adapter found ({err:#})");
            None
        }
    }
}

fn pipeline(renderer: &mut HeadlessRenderer, effect: &str, decay: f32) -> FeedbackPipeline {
    let mut pipeline = FeedbackPipeline::with_session(
        PipelineSettings {
            decay,
            ..PipelineSettings::default()
        },
        SessionRandomizer::seeded(3),
    )
    .unwrap();
    pipeline.bind_content(
        renderer.backend_mut(),
        Box::new(ShapeContent::new(Shape::Diamond, 24.0, [0.0, 0.0, 0.0, 1.0])),
    );
    pipeline
        .select_effect(
            renderer.backend_mut(),
            EffectSelection::named(effect, Preprocess::None).unwrap(),
            ParamSet::new(),
        )
        .unwrap();
    pipeline
}

fn still_frame(frame: u32) -> FrameInput {
    FrameInput {
        viewport: Viewport::from_device(DeviceSize::new(SIZE, SIZE)),
        pose: PoseSample {
            position: Pose::new(32.0, 32.0),
            active: true,
            session_id: 1,
        },
        elapsed: Duration::from_millis(16) * frame,
    }
}

fn energy(texels: &[[f32; 4]]) -> f32 {
    texels.iter().map(|texel| texel[3]).sum()
}

#[test]
fn stationary_trail_decays_to_transparent() {
    let Some(context) = headless() else {
        return;
    };
    let mut renderer = HeadlessRenderer::new(&context);
    let mut pipeline = pipeline(&mut renderer, "motion_blur", 0.95);

    let mut energies = Vec::new();
    for frame in 0..100 {
        let output = pipeline.frame(renderer.backend_mut(), &still_frame(frame));
        let surface = output.surface.expect("pipeline output");
        energies.push(energy(&renderer.read(surface).unwrap()));
    }

    assert!(energies[0] > 100.0, "content was not captured: {}", energies[0]);
    for pair in energies.windows(2) {
        assert!(pair[1] <= pair[0], "energy increased: {} -> {}", pair[0], pair[1]);
    }
    assert!(energies[99] < energies[0] * 0.01);
    assert!(pipeline.failure().is_none());
}

#[test]
fn snapshot_holds_the_content_shape() {
    let Some(context) = headless() else {
        return;
    };
    let mut renderer = HeadlessRenderer::new(&context);
    let mut pipeline = pipeline(&mut renderer, "motion_blur", 0.9);
    pipeline.frame(renderer.backend_mut(), &still_frame(0));
    let snapshot = pipeline.pool().snapshot().unwrap();
    let texels = renderer.read(snapshot.id).unwrap();

    let at = |x: usize, y: usize| texels[y * SIZE as usize + x];
    assert!(at(32, 32)[3] > 0.9);
    assert_eq!(at(0, 0)[3], 0.0);
    assert_eq!(at(63, 63)[3], 0.0);
}

#[test]
fn ascii_trail_exports_an_opaque_image() {
    let Some(context) = headless() else {
        return;
    };
    let mut renderer = HeadlessRenderer::new(&context);
    let mut pipeline = pipeline(&mut renderer, "ascii_trail", 0.95);
    let mut output = None;
    for frame in 0..4 {
        output = pipeline
            .frame(renderer.backend_mut(), &still_frame(frame))
            .surface;
    }

    let image = renderer
        .capture(output, DeviceSize::new(SIZE, SIZE), [1.0, 1.0, 1.0])
        .unwrap();
    assert_eq!((image.width, image.height), (SIZE, SIZE));
    assert_eq!(image.rgba.len(), (SIZE * SIZE * 4) as usize);
    assert!(image.rgba.chunks_exact(4).all(|px| px[3] == 255));
    // glyph ink darkens at least one pixel near the content
    assert!(image.rgba.chunks_exact(4).any(|px| px[0] < 200));
    assert!(pipeline.failure().is_none());
}
