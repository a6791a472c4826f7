use crate::backend::FrameBuffer;
use crate::error::{ShotError, ShotResult};
use crate::pool::TaskGroup;
use crate::rect::CaptureRect;
use crate::request::ScreenshotQueue;

/// Where a slot is in its copy / drain / reuse cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotPhase {
    /// Past its reuse barrier, accumulating requests for the next copy.
    Filling,
    /// Copy issued, queue frozen until the drain.
    Copied,
    /// Mapped, with encode tasks dispatched from it. Stays mapped until its
    /// reuse barrier, even when it is already back at the front.
    Draining,
    /// Holds no pixels or tasks anyone waits on.
    Retiring,
}

/// One frame buffer with its request queue and task group.
pub struct BufferSlot {
    pub(crate) buffer: Box<dyn FrameBuffer>,
    pub(crate) queue: ScreenshotQueue,
    pub(crate) tasks: TaskGroup,
    pub(crate) phase: SlotPhase,
    /// Area of the last successful copy, `None` if it failed or never ran.
    pub(crate) copied_area: Option<CaptureRect>,
    pub(crate) mapped: bool,
}

impl BufferSlot {
    fn new(buffer: Box<dyn FrameBuffer>, phase: SlotPhase) -> Self {
        Self {
            buffer,
            queue: ScreenshotQueue::new(),
            tasks: TaskGroup::new(),
            phase,
            copied_area: None,
            mapped: false,
        }
    }

    pub fn phase(&self) -> SlotPhase {
        self.phase
    }

    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    pub fn outstanding_tasks(&self) -> usize {
        self.tasks.pending()
    }

    pub(crate) fn unmap(&mut self) {
        if self.mapped {
            self.buffer.unmap();
            self.mapped = false;
        }
    }
}

impl std::fmt::Debug for BufferSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSlot")
            .field("phase", &self.phase)
            .field("queued", &self.queue.len())
            .field("tasks", &self.tasks.pending())
            .field("copied_area", &self.copied_area)
            .field("mapped", &self.mapped)
            .finish()
    }
}

/// Fixed ring of `N >= 2` slots with a rotating front cursor.
///
/// The drain slot sits `N / 2` positions after the front, so a slot copied
/// on cycle K is drained on cycle K + (N - N/2) and copied again on K + N.
#[derive(Debug)]
pub struct SlotRing {
    slots: Vec<BufferSlot>,
    front: usize,
}

impl SlotRing {
    pub fn new(buffers: Vec<Box<dyn FrameBuffer>>) -> ShotResult<Self> {
        if buffers.len() < 2 {
            return Err(ShotError::InvalidConfig(format!(
                "slot ring needs at least 2 frame buffers, got {}",
                buffers.len()
            )));
        }
        let slots = buffers
            .into_iter()
            .enumerate()
            .map(|(i, buffer)| {
                let phase = if i == 0 {
                    SlotPhase::Filling
                } else {
                    SlotPhase::Retiring
                };
                BufferSlot::new(buffer, phase)
            })
            .collect();
        Ok(Self { slots, front: 0 })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn front_index(&self) -> usize {
        self.front
    }

    pub fn drain_index(&self) -> usize {
        (self.front + self.slots.len() / 2) % self.slots.len()
    }

    /// Slot index `offset` positions after the front.
    pub fn index_after_front(&self, offset: usize) -> usize {
        (self.front + offset) % self.slots.len()
    }

    pub fn slot(&self, index: usize) -> &BufferSlot {
        &self.slots[index]
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut BufferSlot {
        &mut self.slots[index]
    }

    pub(crate) fn front_mut(&mut self) -> &mut BufferSlot {
        &mut self.slots[self.front]
    }

    pub fn slots(&self) -> impl Iterator<Item = &BufferSlot> {
        self.slots.iter()
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut BufferSlot> {
        self.slots.iter_mut()
    }

    /// Advance the front cursor. An idle new front starts filling; one still
    /// draining keeps that phase until its reuse barrier. The front accepts
    /// requests in either case.
    pub(crate) fn rotate(&mut self) {
        self.front = (self.front + 1) % self.slots.len();
        let slot = &mut self.slots[self.front];
        if slot.phase == SlotPhase::Retiring {
            slot.phase = SlotPhase::Filling;
        }
    }
}
