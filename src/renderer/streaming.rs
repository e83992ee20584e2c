//! Per-frame CPU to GPU streaming through fenced ring buffers.
//!
//! Every stream buffer is split into one region per frame in flight. A region
//! is rewritten only after the fence issued behind the last frame that read
//! it has signaled, or after the wait for it timed out.

use std::time::Duration;

use crate::error::RenderError;
use crate::gpu::{
    BufferDescriptor, BufferHandle, BufferUsage, FenceHandle, GpuContext, GpuDevice, MapAccess,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotWait {
    /// No fence was pending on the slot.
    Idle,
    Signaled,
    TimedOut,
}

/// One ring position. Owns the fence that gates rewriting its regions.
#[derive(Debug, Default)]
pub struct FrameSlot {
    fence: Option<FenceHandle>,
}

impl FrameSlot {
    pub fn fence(&self) -> Option<FenceHandle> {
        self.fence
    }

    fn wait_and_release<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        timeout: Duration,
    ) -> SlotWait {
        let Some(fence) = self.fence.take() else {
            return SlotWait::Idle;
        };
        let device = ctx.device_mut();
        let signaled = device.wait_fence(fence, timeout);
        device.free_fence(fence);
        if signaled {
            SlotWait::Signaled
        } else {
            SlotWait::TimedOut
        }
    }

    fn fence_now<D: GpuDevice>(&mut self, ctx: &mut GpuContext<D>) {
        if let Some(stale) = self.fence.take() {
            ctx.device_mut().free_fence(stale);
        }
        self.fence = Some(ctx.device_mut().create_fence());
    }
}

/// Guard for the frame currently being recorded. Hand it back through
/// [`FrameRing::end_frame`] once the frame's commands are submitted.
#[must_use = "a frame must be ended to fence its ring slot"]
#[derive(Debug)]
pub struct ActiveFrame {
    slot: usize,
    frame: u64,
    ended: bool,
}

impl ActiveFrame {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn frame_number(&self) -> u64 {
        self.frame
    }

    /// Parity of the frame, selecting double-buffered outputs.
    pub fn parity(&self) -> usize {
        (self.frame % 2) as usize
    }
}

impl Drop for ActiveFrame {
    fn drop(&mut self) {
        if !self.ended && !std::thread::panicking() {
            log::warn!(
                "Frame {} dropped without being ended; ring slot {} stays unfenced",
                self.frame,
                self.slot
            );
        }
    }
}

/// The fence ring shared by all per-frame streams.
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    frame_counter: u64,
    fence_timeout: Duration,
    timeouts: u32,
}

impl FrameRing {
    pub fn new(frames_in_flight: usize, fence_timeout: Duration) -> Self {
        let frames_in_flight = frames_in_flight.max(1);
        Self {
            slots: (0..frames_in_flight).map(|_| FrameSlot::default()).collect(),
            frame_counter: 0,
            fence_timeout,
            timeouts: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    pub fn begin_frame(&mut self) -> ActiveFrame {
        ActiveFrame {
            slot: (self.frame_counter % self.slots.len() as u64) as usize,
            frame: self.frame_counter,
            ended: false,
        }
    }

    /// Waits for the GPU to release `frame`'s slot. The first call in a frame
    /// does the waiting; later calls find the slot already released.
    pub fn acquire_slot<D: GpuDevice>(
        &mut self,
        ctx: &mut GpuContext<D>,
        frame: &ActiveFrame,
    ) -> SlotWait {
        let timeout = self.fence_timeout;
        let wait = self.slots[frame.slot].wait_and_release(ctx, timeout);
        if wait == SlotWait::TimedOut {
            self.timeouts += 1;
            log::warn!(
                "{}; overwriting slot {} for frame {}",
                RenderError::FenceTimeout {
                    slot: frame.slot,
                    timeout,
                },
                frame.slot,
                frame.frame
            );
        }
        wait
    }

    /// Fences the frame's slot behind everything recorded so far, submits and
    /// advances to the next slot.
    pub fn end_frame<D: GpuDevice>(&mut self, ctx: &mut GpuContext<D>, mut frame: ActiveFrame) {
        self.slots[frame.slot].fence_now(ctx);
        ctx.device_mut().flush();
        self.frame_counter = frame.frame + 1;
        frame.ended = true;
    }

    /// Fence timeouts since the last call.
    pub fn take_timeouts(&mut self) -> u32 {
        std::mem::take(&mut self.timeouts)
    }

    pub fn destroy<D: GpuDevice>(&mut self, ctx: &mut GpuContext<D>) {
        for slot in &mut self.slots {
            if let Some(fence) = slot.fence.take() {
                ctx.device_mut().free_fence(fence);
            }
        }
    }
}

/// A GPU buffer carved into one `slot_size` region per ring slot.
#[derive(Debug)]
pub struct FrameDataStreamer {
    label: String,
    buffer: BufferHandle,
    slot_size: u64,
    slots: usize,
}

impl FrameDataStreamer {
    pub fn new<D: GpuDevice>(
        ctx: &mut GpuContext<D>,
        label: &str,
        slot_size: u64,
        slots: usize,
    ) -> Self {
        let buffer = ctx.device_mut().create_buffer(&BufferDescriptor {
            label,
            size: slot_size * slots as u64,
            usage: BufferUsage::STREAM | BufferUsage::MAP_WRITE,
        });
        log::debug!(
            "Created stream '{}' with {} slots of {} bytes",
            label,
            slots,
            slot_size
        );
        Self {
            label: label.to_string(),
            buffer,
            slot_size,
            slots,
        }
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn slot_size(&self) -> u64 {
        self.slot_size
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn slot_offset(&self, slot: usize) -> u64 {
        slot as u64 * self.slot_size
    }

    pub fn check_capacity(&self, len: usize) -> Result<(), RenderError> {
        if len as u64 > self.slot_size {
            return Err(RenderError::BufferOverflow {
                buffer: self.label.clone(),
                requested: len as u64,
                capacity: self.slot_size,
            });
        }
        Ok(())
    }

    /// Copies `bytes` into the region of `frame`'s slot and returns its byte
    /// offset in the buffer.
    ///
    /// # Panics
    ///
    /// If `bytes` does not fit in one slot. Slot sizes are fixed at setup
    /// from the configured per-frame limits.
    pub fn upload<D: GpuDevice>(
        &self,
        ctx: &mut GpuContext<D>,
        ring: &mut FrameRing,
        frame: &ActiveFrame,
        bytes: &[u8],
    ) -> u64 {
        if let Err(err) = self.check_capacity(bytes.len()) {
            panic!("{err}");
        }
        debug_assert!(frame.slot < self.slots, "stream has fewer slots than the ring");

        ring.acquire_slot(ctx, frame);

        let offset = self.slot_offset(frame.slot);
        if bytes.is_empty() {
            return offset;
        }

        let access = MapAccess::WRITE | MapAccess::INVALIDATE_RANGE | MapAccess::UNSYNCHRONIZED;
        let device = ctx.device_mut();
        let mapped = match device.map_buffer_range(self.buffer, access, offset, bytes.len() as u64)
        {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => {
                log::error!(
                    "Failed to map slot {} of stream '{}'",
                    frame.slot,
                    self.label
                );
                false
            }
        };
        if mapped {
            device.unmap_buffer(self.buffer);
        }
        offset
    }

    pub fn destroy<D: GpuDevice>(self, ctx: &mut GpuContext<D>) {
        ctx.device_mut().destroy_buffer(self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Command, HeadlessDevice};
    use glam::UVec2;

    fn setup(slots: usize) -> (GpuContext<HeadlessDevice>, FrameRing, FrameDataStreamer) {
        let mut ctx = GpuContext::new(HeadlessDevice::new(), UVec2::new(8, 8));
        let ring = FrameRing::new(slots, Duration::from_millis(5));
        let streamer = FrameDataStreamer::new(&mut ctx, "Test", 64, slots);
        (ctx, ring, streamer)
    }

    #[test]
    fn offsets_rotate_through_slots() {
        let (mut ctx, mut ring, streamer) = setup(3);
        let mut offsets = Vec::new();
        for _ in 0..4 {
            let frame = ring.begin_frame();
            offsets.push(streamer.upload(&mut ctx, &mut ring, &frame, &[1, 2, 3, 4]));
            ring.end_frame(&mut ctx, frame);
        }
        assert_eq!(offsets, vec![0, 64, 128, 0]);
    }

    #[test]
    fn uploaded_bytes_land_in_slot_region() {
        let (mut ctx, mut ring, streamer) = setup(2);
        let frame = ring.begin_frame();
        ring.end_frame(&mut ctx, frame);

        let frame = ring.begin_frame();
        let offset = streamer.upload(&mut ctx, &mut ring, &frame, &[9, 8, 7]);
        ring.end_frame(&mut ctx, frame);

        let data = ctx.device().buffer_data(streamer.buffer()).expect("buffer");
        assert_eq!(offset, 64);
        assert_eq!(&data[64..67], &[9, 8, 7]);
    }

    #[test]
    fn timeout_is_logged_and_upload_proceeds() {
        let (mut ctx, mut ring, streamer) = setup(1);
        ctx.device_mut().set_stalled(true);

        let frame = ring.begin_frame();
        streamer.upload(&mut ctx, &mut ring, &frame, &[1]);
        ring.end_frame(&mut ctx, frame);

        let frame = ring.begin_frame();
        let offset = streamer.upload(&mut ctx, &mut ring, &frame, &[2]);
        ring.end_frame(&mut ctx, frame);

        assert_eq!(ring.take_timeouts(), 1);
        assert_eq!(ring.take_timeouts(), 0);
        let data = ctx.device().buffer_data(streamer.buffer()).expect("buffer");
        assert_eq!(data[offset as usize], 2);
    }

    #[test]
    fn later_uploads_in_a_frame_do_not_wait_again() {
        let (mut ctx, mut ring, streamer) = setup(1);
        let frame = ring.begin_frame();
        ring.end_frame(&mut ctx, frame);

        let frame = ring.begin_frame();
        assert_eq!(ring.acquire_slot(&mut ctx, &frame), SlotWait::Signaled);
        streamer.upload(&mut ctx, &mut ring, &frame, &[1]);
        ring.end_frame(&mut ctx, frame);

        let waits = ctx
            .device()
            .commands()
            .iter()
            .filter(|cmd| matches!(cmd, Command::WaitFence { .. }))
            .count();
        assert_eq!(waits, 1);
    }

    #[test]
    fn capacity_check_reports_overflow() {
        let (_ctx, _ring, streamer) = setup(1);
        assert!(streamer.check_capacity(64).is_ok());
        assert!(matches!(
            streamer.check_capacity(65),
            Err(RenderError::BufferOverflow { requested: 65, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn oversized_upload_panics() {
        let (mut ctx, mut ring, streamer) = setup(1);
        let frame = ring.begin_frame();
        streamer.upload(&mut ctx, &mut ring, &frame, &[0u8; 65]);
        ring.end_frame(&mut ctx, frame);
    }
}
