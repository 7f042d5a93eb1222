/*!
 # Schedule synchronization

 Moves a whole [`Schedule`] between the host and the device's slot array.
 Both directions are a bounded loop of single-slot round trips; a
 [`Progress`] observer is told about every processed slot and a
 [`CancelFlag`] is checked between slots.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::device::TimerDevice;
use crate::schedule::{Schedule, ScheduleRow};
use crate::transport::Transport;
use crate::{Error, Result};

/// Observer for long slot sequences
pub trait Progress: Send {
    /// Called once before the first slot with the number of slots to process
    fn begin(&mut self, total: usize);

    /// Called once after each processed slot, in slot order
    fn advance(&mut self);

    /// Called when the sequence ends, successfully or not
    fn finish(&mut self) {}
}

/// Progress observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn begin(&mut self, _total: usize) {}
    fn advance(&mut self) {}
}

/// Progress observer that reports through `tracing`
#[derive(Debug)]
pub struct LogProgress {
    label: String,
    done: usize,
    total: usize,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            done: 0,
            total: 0,
        }
    }
}

impl Progress for LogProgress {
    fn begin(&mut self, total: usize) {
        self.done = 0;
        self.total = total;
        info!("{}: {} slots", self.label, total);
    }

    fn advance(&mut self) {
        self.done += 1;
        // Roughly every tenth of the way
        let step = (self.total / 10).max(1);
        if self.done % step == 0 || self.done == self.total {
            info!("{}: {}/{}", self.label, self.done, self.total);
        } else {
            debug!("{}: {}/{}", self.label, self.done, self.total);
        }
    }

    fn finish(&mut self) {
        debug!("{}: finished at {}/{}", self.label, self.done, self.total);
    }
}

/// Cooperative cancellation shared between a sequence and whoever wants to stop it
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clears the flag so it can be reused for the next sequence
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Outcome of a successful [`write_schedule`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// Slots holding scheduled actions, starting at slot 0
    pub written: usize,
    /// Trailing slots overwritten with the empty action
    pub cleared: usize,
    /// Table rows skipped because they were incomplete
    pub dropped_rows: Vec<usize>,
}

fn slot_index(index: usize) -> Result<u16> {
    u16::try_from(index)
        .map_err(|_| Error::Validation(format!("slot index {} does not fit in 16 bits", index)))
}

/// Reads every device slot into a new table sized to the device
///
/// The firmware's `action_count` is only the length of the leading run of
/// valid slots and memory is never compacted, so it is not a bound. Each
/// slot's own valid flag decides whether its row is filled.
#[instrument(skip_all)]
pub async fn read_schedule<T: Transport>(
    device: &mut TimerDevice<T>,
    progress: &mut dyn Progress,
    cancel: &CancelFlag,
) -> Result<Schedule> {
    let info = device.get_info().await?;
    let capacity = info.capacity();
    debug!(
        "Device reports {} leading actions in {} slots",
        info.action_count, capacity
    );

    let mut schedule = Schedule::new(capacity);
    progress.begin(capacity);
    let result = read_slots(device, &mut schedule, progress, cancel).await;
    progress.finish();
    result?;

    info!(
        "Read {} slots, {} hold actions",
        capacity,
        schedule.rows().iter().filter(|r| !r.is_empty()).count()
    );
    Ok(schedule)
}

async fn read_slots<T: Transport>(
    device: &mut TimerDevice<T>,
    schedule: &mut Schedule,
    progress: &mut dyn Progress,
    cancel: &CancelFlag,
) -> Result<()> {
    let count = schedule.len();
    for index in 0..count {
        if cancel.is_cancelled() {
            warn!("Read cancelled after {} of {} slots", index, count);
            return Err(Error::Cancelled);
        }

        let action = device.get_action(slot_index(index)?).await?;
        schedule.rows_mut()[index] = ScheduleRow::from_action(&action);
        progress.advance();
    }
    Ok(())
}

/// Writes `schedule` over every slot of the device
///
/// Complete rows go to slots 0, 1, 2, ... in time order and every slot after
/// them is cleared, so rewriting from scratch is always safe. The timer is
/// stopped before the first slot and started again after the last one.
///
/// If a slot write fails the sequence stops and the timer stays stopped;
/// the device contents are undefined until a full write succeeds. If the
/// sequence is cancelled the timer is started again before returning
/// [`Error::Cancelled`].
#[instrument(skip_all, fields(rows = schedule.len()))]
pub async fn write_schedule<T: Transport>(
    device: &mut TimerDevice<T>,
    schedule: &Schedule,
    progress: &mut dyn Progress,
    cancel: &CancelFlag,
) -> Result<WriteReport> {
    let info = device.get_info().await?;
    let capacity = info.capacity();
    let plan = schedule.plan(capacity)?;
    debug!(
        "Writing {} actions and {} empty slots",
        plan.used,
        capacity - plan.used
    );

    device.stop_timer().await?;

    progress.begin(capacity);
    let result = write_slots(device, &plan.actions, progress, cancel).await;
    progress.finish();

    match result {
        Ok(()) => {}
        Err(Error::Cancelled) => {
            device.start_timer().await?;
            return Err(Error::Cancelled);
        }
        Err(e) => {
            error!("Schedule write aborted, the device timer is left stopped: {}", e);
            return Err(e);
        }
    }

    device.start_timer().await?;

    info!(
        "Wrote {} actions, cleared {} slots",
        plan.used,
        capacity - plan.used
    );
    Ok(WriteReport {
        written: plan.used,
        cleared: capacity - plan.used,
        dropped_rows: plan.dropped_rows,
    })
}

async fn write_slots<T: Transport>(
    device: &mut TimerDevice<T>,
    actions: &[crate::types::Action],
    progress: &mut dyn Progress,
    cancel: &CancelFlag,
) -> Result<()> {
    for (index, action) in actions.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(
                "Write cancelled after {} of {} slots, restarting the timer",
                index,
                actions.len()
            );
            return Err(Error::Cancelled);
        }

        device.set_action(slot_index(index)?, action).await?;
        progress.advance();
    }
    Ok(())
}
