//! Frame loop scenario tests driven by the simulated GPU


use std::sync::Arc;

use crate::core::config::RendererConfig;
use crate::render::device::GpuDeviceContext;
use crate::render::orchestrator::FrameOrchestrator;
use crate::render::testing::{MockContent, MockDevice, MockWindow};

type TestLoop = FrameOrchestrator<MockWindow, MockContent>;

/// Build a frame loop over a configured mock device
fn frame_loop(frames_in_flight: usize, mock: Arc<MockDevice>, window: MockWindow) -> TestLoop {
    let _ = env_logger::builder().is_test(true).try_init();
    let ctx = GpuDeviceContext::new(mock.clone(), 0, 0);
    let config = RendererConfig::default().with_max_frames_in_flight(frames_in_flight);
    FrameOrchestrator::new(ctx, window, MockContent::new(mock), &config).unwrap()
}
