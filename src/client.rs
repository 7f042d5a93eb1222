use chrono::NaiveDateTime;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{info, instrument};

use crate::device::TimerDevice;
use crate::schedule::Schedule;
use crate::sync::{self, CancelFlag, Progress, WriteReport};
use crate::transport::{SerialConfig, SerialTransport, Transport};
use crate::types::{Action, DateTimeInfo, DeviceInfo};
use crate::{Error, Result};

type BoxedDevice = TimerDevice<Box<dyn Transport>>;

/// Caller-facing handle to one timer appliance
///
/// Holds at most one open connection. Every operation takes the connection
/// lock for its whole duration, so a schedule read or write is never
/// interleaved with another command.
#[derive(Default)]
pub struct TimerClient {
    connection: Mutex<Option<BoxedDevice>>,
}

impl TimerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the serial port; fails if a connection is already open
    #[instrument(skip(self))]
    pub async fn connect(&self, config: &SerialConfig) -> Result<()> {
        let mut slot = self.connection.lock().await;
        if let Some(device) = slot.as_ref() {
            return Err(Error::AlreadyConnected(device.transport().name().to_string()));
        }

        let transport = SerialTransport::open(config)?;
        *slot = Some(TimerDevice::new(Box::new(transport)));
        info!("Connected to {}", config.port);
        Ok(())
    }

    /// Uses an already open transport; fails if a connection is already open
    pub async fn connect_with<T: Transport + 'static>(&self, transport: T) -> Result<()> {
        let mut slot = self.connection.lock().await;
        if let Some(device) = slot.as_ref() {
            return Err(Error::AlreadyConnected(device.transport().name().to_string()));
        }

        info!("Connected to {}", transport.name());
        *slot = Some(TimerDevice::new(Box::new(transport)));
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Closes the connection if one is open
    pub async fn close(&self) -> Result<()> {
        if let Some(mut device) = self.connection.lock().await.take() {
            device.close().await?;
        }
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.device().await?.start_timer().await
    }

    pub async fn stop(&self) -> Result<()> {
        self.device().await?.stop_timer().await
    }

    pub async fn get_clock(&self) -> Result<DateTimeInfo> {
        self.device().await?.get_datetime().await
    }

    /// Sets the device clock to the host's local time
    pub async fn set_clock(&self) -> Result<()> {
        self.device().await?.sync_datetime().await
    }

    pub async fn set_clock_to(&self, now: &NaiveDateTime) -> Result<()> {
        self.device().await?.set_datetime(now).await
    }

    pub async fn get_action(&self, index: u16) -> Result<Action> {
        self.device().await?.get_action(index).await
    }

    pub async fn set_action(&self, index: u16, action: &Action) -> Result<()> {
        self.device().await?.set_action(index, action).await
    }

    pub async fn switch(&self, major: char, minor: u8, command: u8) -> Result<()> {
        self.device().await?.switch(major, minor, command).await
    }

    pub async fn get_info(&self) -> Result<DeviceInfo> {
        self.device().await?.get_info().await
    }

    pub async fn set_verbose(&self) -> Result<()> {
        self.device().await?.set_verbose().await
    }

    pub async fn reset(&self) -> Result<()> {
        self.device().await?.reset().await
    }

    /// Reads the whole schedule; see [`sync::read_schedule`]
    pub async fn read_schedule(
        &self,
        progress: &mut dyn Progress,
        cancel: &CancelFlag,
    ) -> Result<Schedule> {
        let mut device = self.device().await?;
        sync::read_schedule(&mut *device, progress, cancel).await
    }

    /// Writes the whole schedule; see [`sync::write_schedule`]
    pub async fn write_schedule(
        &self,
        schedule: &Schedule,
        progress: &mut dyn Progress,
        cancel: &CancelFlag,
    ) -> Result<WriteReport> {
        let mut device = self.device().await?;
        sync::write_schedule(&mut *device, schedule, progress, cancel).await
    }

    async fn device(&self) -> Result<MappedMutexGuard<'_, BoxedDevice>> {
        MutexGuard::try_map(self.connection.lock().await, |slot| slot.as_mut())
            .map_err(|_| Error::NotConnected)
    }
}
