use std::time::Duration;

use forward_renderer::gpu::{Command, GpuContext, HeadlessDevice, MapAccess};
use forward_renderer::renderer::{FrameDataStreamer, FrameRing};
use glam::UVec2;

const SLOTS: usize = 3;

fn setup() -> (GpuContext<HeadlessDevice>, FrameRing, FrameDataStreamer) {
    let mut device = HeadlessDevice::new();
    // The simulated GPU lags far behind so no fence signals on its own.
    device.set_gpu_latency(16);
    let mut ctx = GpuContext::new(device, UVec2::new(4, 4));
    let ring = FrameRing::new(SLOTS, Duration::from_millis(50));
    let streamer = FrameDataStreamer::new(&mut ctx, "Ring", 128, SLOTS);
    (ctx, ring, streamer)
}

#[test]
fn slot_is_rewritten_only_after_its_first_fence_signals() {
    let (mut ctx, mut ring, streamer) = setup();

    let mut first_fence = None;
    for frame_index in 0..SLOTS {
        let frame = ring.begin_frame();
        streamer.upload(&mut ctx, &mut ring, &frame, &[frame_index as u8; 16]);
        ring.end_frame(&mut ctx, frame);
        if frame_index == 0 {
            first_fence = ring.slot(0).and_then(|slot| slot.fence());
        }
    }
    let first_fence = first_fence.expect("slot 0 fenced");
    assert!(!ctx.device().fence_signaled(first_fence));

    ctx.device_mut().take_commands();
    let frame = ring.begin_frame();
    assert_eq!(frame.slot(), 0);
    let offset = streamer.upload(&mut ctx, &mut ring, &frame, &[0xAB; 16]);
    ring.end_frame(&mut ctx, frame);
    assert_eq!(offset, 0);

    let commands = ctx.device().commands();
    let wait = commands
        .iter()
        .position(|command| {
            matches!(command, Command::WaitFence { fence, signaled: true, .. } if *fence == first_fence)
        })
        .expect("waited on the first fence");
    let write = commands
        .iter()
        .position(|command| {
            matches!(command, Command::MapBuffer { access, .. } if access.contains(MapAccess::WRITE))
        })
        .expect("mapped for writing");
    assert!(wait < write);
    assert_eq!(ring.take_timeouts(), 0);
}

#[test]
fn stalled_gpu_times_out_and_overwrites() {
    let (mut ctx, mut ring, streamer) = setup();
    ctx.device_mut().set_stalled(true);

    for frame_index in 0..=SLOTS {
        let frame = ring.begin_frame();
        streamer.upload(&mut ctx, &mut ring, &frame, &[frame_index as u8; 4]);
        ring.end_frame(&mut ctx, frame);
    }

    assert_eq!(ring.take_timeouts(), 1);
    let data = ctx.device().buffer_data(streamer.buffer()).expect("buffer");
    assert_eq!(&data[0..4], &[SLOTS as u8; 4]);
}
