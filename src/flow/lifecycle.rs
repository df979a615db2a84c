//! Run and picker exclusivity.
//!
//! A run holds a [`RunTicket`], a picker session holds a [`PickerLease`] and an
//! action recording holds a [`RecordingLease`]. Each releases its slot when dropped,
//! so an early return or a panic cannot leave the controller stuck in "running".

use crate::error::{FlowError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Slots {
    running: bool,
    picker: bool,
    recording: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    slots: Arc<Mutex<Slots>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run slot. `None` when a run is already active.
    pub fn try_start(&self) -> Option<RunTicket> {
        let mut slots = self.slots.lock();
        if slots.running {
            return None;
        }
        slots.running = true;
        Some(RunTicket {
            slots: Arc::clone(&self.slots),
        })
    }

    /// Claim the picker slot for one session.
    pub fn try_lock_for_picker(&self) -> Result<PickerLease> {
        let mut slots = self.slots.lock();
        if slots.picker {
            return Err(FlowError::PickerInProgress);
        }
        slots.picker = true;
        Ok(PickerLease {
            slots: Arc::clone(&self.slots),
        })
    }

    /// Claim the recording slot. Recording drives the page by hand, so it excludes
    /// runs and picker sessions.
    pub fn try_lock_for_recording(&self) -> Result<RecordingLease> {
        let mut slots = self.slots.lock();
        if slots.recording {
            return Err(FlowError::RecordingInProgress);
        }
        if slots.running {
            return Err(FlowError::FlowRunning);
        }
        if slots.picker {
            return Err(FlowError::PickerInProgress);
        }
        slots.recording = true;
        Ok(RecordingLease {
            slots: Arc::clone(&self.slots),
        })
    }

    /// Fails while a picker session or a recording owns the page.
    pub fn ensure_page_replaceable(&self) -> Result<()> {
        let slots = self.slots.lock();
        if slots.picker || slots.recording {
            return Err(FlowError::PageLocked);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.slots.lock().running
    }

    pub fn is_picker_active(&self) -> bool {
        self.slots.lock().picker
    }

    pub fn is_recording(&self) -> bool {
        self.slots.lock().recording
    }
}

#[derive(Debug)]
pub struct RunTicket {
    slots: Arc<Mutex<Slots>>,
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        self.slots.lock().running = false;
    }
}

#[derive(Debug)]
pub struct PickerLease {
    slots: Arc<Mutex<Slots>>,
}

impl Drop for PickerLease {
    fn drop(&mut self) {
        self.slots.lock().picker = false;
    }
}

#[derive(Debug)]
pub struct RecordingLease {
    slots: Arc<Mutex<Slots>>,
}

impl Drop for RecordingLease {
    fn drop(&mut self) {
        self.slots.lock().recording = false;
    }
}
