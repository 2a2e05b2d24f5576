//! Frame resource ring
//!
//! Per-frame GPU resources (command buffer, sync objects, uniform buffers)
//! cycle through a fixed ring so the CPU can record frame N while the GPU
//! drains frames N-1 and N-2. The lifecycle bookkeeping lives in
//! `FrameRingState`, a device-free state machine: each slot moves
//! Idle -> Recording -> Submitted and back, and every submission is stamped
//! with a monotonically increasing serial. The CPU only ever blocks when a
//! slot it needs is still Submitted.

use crate::config::RendererConfig;
use crate::render::types::{MaterialConstants, ObjectConstants, PassConstants};
use crate::render::vulkan::{
    CommandPool, DynamicUniformBuffer, FrameSync, UniformBuffer, VulkanContext, VulkanError,
    VulkanResult,
};
use ash::vk;
use thiserror::Error;

/// Lifecycle violations in the frame ring
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    /// A transition was attempted from the wrong phase
    #[error("invalid frame transition: slot {slot} is {phase}, expected {expected}")]
    InvalidTransition {
        slot: usize,
        phase: &'static str,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotPhase {
    Idle,
    Recording,
    Submitted { serial: u64 },
}

impl SlotPhase {
    fn name(self) -> &'static str {
        match self {
            SlotPhase::Idle => "Idle",
            SlotPhase::Recording => "Recording",
            SlotPhase::Submitted { .. } => "Submitted",
        }
    }
}

/// Device-free lifecycle tracker for the frame ring
#[derive(Debug)]
pub struct FrameRingState {
    slots: Vec<SlotPhase>,
    current: usize,
    next_serial: u64,
    completed_serial: u64,
}

impl FrameRingState {
    /// Create a ring with `frames_in_flight` slots, all idle
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight >= 1);
        Self {
            slots: vec![SlotPhase::Idle; frames_in_flight],
            current: 0,
            // Serial 0 is reserved as "nothing submitted yet".
            next_serial: 1,
            completed_serial: 0,
        }
    }

    /// Number of slots in the ring
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the ring has a single slot
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the slot the next frame will record into
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Serial the caller must wait for before the current slot can be
    /// reused, or `None` when the slot is already idle
    pub fn required_wait(&self) -> Option<u64> {
        match self.slots[self.current] {
            SlotPhase::Submitted { serial } => Some(serial),
            _ => None,
        }
    }

    /// Mark the current slot's prior submission as retired after its fence
    /// signaled
    pub fn retire_current(&mut self) -> Result<u64, RingError> {
        match self.slots[self.current] {
            SlotPhase::Submitted { serial } => {
                self.slots[self.current] = SlotPhase::Idle;
                // Submissions retire in ring order, so this only moves up.
                debug_assert!(serial > self.completed_serial);
                self.completed_serial = serial;
                Ok(serial)
            }
            phase => Err(RingError::InvalidTransition {
                slot: self.current,
                phase: phase.name(),
                expected: "Submitted",
            }),
        }
    }

    /// Transition the current slot Idle -> Recording
    pub fn begin_recording(&mut self) -> Result<usize, RingError> {
        match self.slots[self.current] {
            SlotPhase::Idle => {
                self.slots[self.current] = SlotPhase::Recording;
                Ok(self.current)
            }
            phase => Err(RingError::InvalidTransition {
                slot: self.current,
                phase: phase.name(),
                expected: "Idle",
            }),
        }
    }

    /// Transition the current slot Recording -> Idle without a submission.
    /// Used when the frame is abandoned after acquire fails.
    pub fn abort_recording(&mut self) -> Result<(), RingError> {
        match self.slots[self.current] {
            SlotPhase::Recording => {
                self.slots[self.current] = SlotPhase::Idle;
                Ok(())
            }
            phase => Err(RingError::InvalidTransition {
                slot: self.current,
                phase: phase.name(),
                expected: "Recording",
            }),
        }
    }

    /// Transition the current slot Recording -> Submitted, stamping it with
    /// a fresh serial and advancing the ring
    pub fn submit(&mut self) -> Result<u64, RingError> {
        match self.slots[self.current] {
            SlotPhase::Recording => {
                let serial = self.next_serial;
                self.next_serial += 1;
                self.slots[self.current] = SlotPhase::Submitted { serial };
                self.current = (self.current + 1) % self.slots.len();
                Ok(serial)
            }
            phase => Err(RingError::InvalidTransition {
                slot: self.current,
                phase: phase.name(),
                expected: "Recording",
            }),
        }
    }

    /// Highest serial known to have retired on the GPU
    pub fn completed_serial(&self) -> u64 {
        self.completed_serial
    }

    /// Serial the next submission will receive
    pub fn next_serial(&self) -> u64 {
        self.next_serial
    }
}

/// GPU resources owned by one frame slot
pub struct FrameResource {
    /// Primary command buffer, re-recorded every time the slot cycles
    pub command_buffer: vk::CommandBuffer,
    /// Acquire/render/fence bundle
    pub sync: FrameSync,
    /// Per-pass constants for this frame
    pub pass_constants: UniformBuffer<PassConstants>,
    /// Per-object constants, one aligned element per drawable
    pub object_constants: DynamicUniformBuffer<ObjectConstants>,
    /// Per-material constants, one aligned element per drawable
    pub material_constants: DynamicUniformBuffer<MaterialConstants>,
    /// Descriptor set binding this slot's uniform buffers
    pub descriptor_set: vk::DescriptorSet,
}

/// The full ring of frame resources plus its lifecycle state
pub struct FrameResourceRing {
    frames: Vec<FrameResource>,
    state: FrameRingState,
}

impl FrameResourceRing {
    /// Allocate frame resources for every slot. Descriptor sets start null
    /// and are written by the renderer once layouts exist.
    pub fn new(
        context: &VulkanContext,
        command_pool: &CommandPool,
        config: &RendererConfig,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let memory_props = context.memory_properties();
        let alignment = context.physical_device.uniform_offset_alignment();

        let command_buffers =
            command_pool.allocate_command_buffers(config.frames_in_flight as u32)?;

        let mut frames = Vec::with_capacity(config.frames_in_flight);
        for command_buffer in command_buffers {
            frames.push(FrameResource {
                command_buffer,
                sync: FrameSync::new(device.clone())?,
                pass_constants: UniformBuffer::new(device.clone(), &memory_props)?,
                object_constants: DynamicUniformBuffer::new(
                    device.clone(),
                    &memory_props,
                    alignment,
                    config.max_objects,
                )?,
                material_constants: DynamicUniformBuffer::new(
                    device.clone(),
                    &memory_props,
                    alignment,
                    config.max_objects,
                )?,
                descriptor_set: vk::DescriptorSet::null(),
            });
        }

        log::debug!(
            "Frame resource ring created: {} slots, {} object capacity",
            config.frames_in_flight,
            config.max_objects
        );

        Ok(Self {
            frames,
            state: FrameRingState::new(config.frames_in_flight),
        })
    }

    /// Block until the current slot's previous submission retires, then
    /// transition it to Recording and return its index
    pub fn begin_frame(&mut self) -> VulkanResult<usize> {
        if self.state.required_wait().is_some() {
            let frame = &self.frames[self.state.current_slot()];
            frame.sync.in_flight.wait_bounded()?;
            frame.sync.in_flight.reset()?;
            self.state.retire_current().map_err(ring_to_vulkan)?;
        }
        self.state.begin_recording().map_err(ring_to_vulkan)
    }

    /// Mark the current slot submitted; the caller has handed its command
    /// buffer to the queue with the slot's fence
    pub fn end_frame(&mut self) -> VulkanResult<u64> {
        self.state.submit().map_err(ring_to_vulkan)
    }

    /// Abandon the frame without submitting (acquire failed)
    pub fn abort_frame(&mut self) -> VulkanResult<()> {
        self.state.abort_recording().map_err(ring_to_vulkan)
    }

    /// Wait for every in-flight slot to retire (resize, shutdown)
    pub fn flush(&mut self) -> VulkanResult<()> {
        for (index, phase) in self.state.slots.iter_mut().enumerate() {
            if let SlotPhase::Submitted { serial } = *phase {
                let frame = &self.frames[index];
                frame.sync.in_flight.wait_bounded()?;
                frame.sync.in_flight.reset()?;
                *phase = SlotPhase::Idle;
                self.state.completed_serial = self.state.completed_serial.max(serial);
            }
        }
        Ok(())
    }

    /// Resources of the slot currently recording
    pub fn current(&self) -> &FrameResource {
        &self.frames[self.state.current_slot()]
    }

    /// Mutable resources of the slot currently recording
    pub fn current_mut(&mut self) -> &mut FrameResource {
        &mut self.frames[self.state.current_slot()]
    }

    /// All frame resources, for descriptor set setup
    pub fn frames_mut(&mut self) -> &mut [FrameResource] {
        &mut self.frames
    }

    /// Highest retired serial, consumed by the upload reclaimer
    pub fn completed_serial(&self) -> u64 {
        self.state.completed_serial()
    }
}

fn ring_to_vulkan(err: RingError) -> VulkanError {
    VulkanError::InvalidOperation {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_cycle_in_order() {
        let mut ring = FrameRingState::new(3);
        for expected in [0usize, 1, 2, 0, 1] {
            assert_eq!(ring.current_slot(), expected);
            assert_eq!(ring.required_wait(), None, "no wait in first lap");
            ring.begin_recording().unwrap();
            ring.submit().unwrap();
            if ring.required_wait().is_some() {
                ring.retire_current().unwrap();
            }
        }
    }

    #[test]
    fn test_serials_strictly_increase() {
        let mut ring = FrameRingState::new(2);
        let mut last = 0;
        for _ in 0..8 {
            if let Some(_serial) = ring.required_wait() {
                ring.retire_current().unwrap();
            }
            ring.begin_recording().unwrap();
            let serial = ring.submit().unwrap();
            assert!(serial > last);
            last = serial;
        }
    }

    #[test]
    fn test_wrapping_requires_wait() {
        let mut ring = FrameRingState::new(2);
        ring.begin_recording().unwrap();
        let first = ring.submit().unwrap();
        ring.begin_recording().unwrap();
        ring.submit().unwrap();

        // Ring has wrapped back to slot 0, which is still submitted.
        assert_eq!(ring.current_slot(), 0);
        assert_eq!(ring.required_wait(), Some(first));
        assert_eq!(ring.begin_recording().unwrap_err(), RingError::InvalidTransition {
            slot: 0,
            phase: "Submitted",
            expected: "Idle",
        });

        ring.retire_current().unwrap();
        assert!(ring.begin_recording().is_ok());
    }

    #[test]
    fn test_every_wait_pairs_with_a_prior_submission() {
        // The fence protocol: a slot's fence is only submitted (and thus
        // only waited on) for work that actually went to the queue. The
        // first lap never waits; every later lap waits on the serial the
        // slot submitted one lap earlier.
        let mut ring = FrameRingState::new(3);
        let mut submitted = Vec::new();
        for frame in 0..9 {
            match ring.required_wait() {
                None => assert!(frame < 3, "only the first lap may skip the wait"),
                Some(serial) => {
                    assert_eq!(serial, submitted[frame - 3]);
                    ring.retire_current().unwrap();
                }
            }
            ring.begin_recording().unwrap();
            submitted.push(ring.submit().unwrap());
        }
    }

    #[test]
    fn test_abort_returns_slot_without_consuming_serial() {
        let mut ring = FrameRingState::new(2);
        ring.begin_recording().unwrap();
        ring.abort_recording().unwrap();

        // The slot is reusable immediately and no serial was spent.
        assert_eq!(ring.current_slot(), 0);
        ring.begin_recording().unwrap();
        assert_eq!(ring.submit().unwrap(), 1);
    }

    #[test]
    fn test_submit_without_recording_rejected() {
        let mut ring = FrameRingState::new(3);
        assert!(ring.submit().is_err());
    }

    #[test]
    fn test_completed_serial_tracks_retirement() {
        let mut ring = FrameRingState::new(1);
        assert_eq!(ring.completed_serial(), 0);

        ring.begin_recording().unwrap();
        let serial = ring.submit().unwrap();
        assert_eq!(ring.completed_serial(), 0);

        ring.retire_current().unwrap();
        assert_eq!(ring.completed_serial(), serial);
    }

    #[test]
    fn test_single_slot_ring_alternates_wait_and_record() {
        let mut ring = FrameRingState::new(1);
        for _ in 0..4 {
            if ring.required_wait().is_some() {
                ring.retire_current().unwrap();
            }
            ring.begin_recording().unwrap();
            ring.submit().unwrap();
            assert!(ring.required_wait().is_some());
        }
    }
}
