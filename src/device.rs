use chrono::NaiveDateTime;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::protocol::{check_status, encode_datetime, encode_index, Command, ProvisionInfo};
use crate::transport::{SerialConfig, SerialTransport, Transport};
use crate::types::{
    Action, DateTimeInfo, DeviceInfo, ACTION_RECORD_SIZE, DATETIME_RECORD_SIZE, INFO_RECORD_SIZE,
};
use crate::{Error, Result};

/// Driver for the timer appliance command set
///
/// Each method is a single request/response exchange. The driver never
/// retries; a failed exchange is reported as [`Error::Command`] naming the
/// command, or as [`Error::Rejected`] when the device sent its failure flag.
pub struct TimerDevice<T: Transport> {
    transport: T,
}

impl TimerDevice<SerialTransport> {
    /// Opens the serial port described by `config`
    #[instrument]
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let transport = SerialTransport::open(config)?;
        Ok(Self::new(transport))
    }
}

impl<T: Transport> TimerDevice<T> {
    /// Wraps an already open transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Closes the transport. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Enables scheduled execution
    #[instrument(skip(self))]
    pub async fn start_timer(&mut self) -> Result<()> {
        debug!("Starting timer");
        self.status_command(Command::StartTimer, &[]).await?;
        info!("Timer started");
        Ok(())
    }

    /// Disables scheduled execution
    #[instrument(skip(self))]
    pub async fn stop_timer(&mut self) -> Result<()> {
        debug!("Stopping timer");
        self.status_command(Command::StopTimer, &[]).await?;
        info!("Timer stopped");
        Ok(())
    }

    /// Reads the device clock
    #[instrument(skip(self))]
    pub async fn get_datetime(&mut self) -> Result<DateTimeInfo> {
        let mut response = [0u8; DATETIME_RECORD_SIZE];
        self.exchange(Command::GetDateTime, &[], &mut response)
            .await?;
        let clock = DateTimeInfo::from_bytes(&response)?;
        debug!("Device clock is {}", clock);
        Ok(clock)
    }

    /// Writes the device clock
    ///
    /// Fails with [`Error::Validation`] before sending anything when the year
    /// is outside 2000-2255.
    #[instrument(skip(self))]
    pub async fn set_datetime(&mut self, now: &NaiveDateTime) -> Result<()> {
        let payload = encode_datetime(now)?;
        debug!("Setting device clock to {}", now);
        self.status_command(Command::SetDateTime, &payload).await?;
        info!("Device clock set to {}", now.format("%d-%m-%Y %H:%M:%S"));
        Ok(())
    }

    /// Sets the device clock to the host's local time
    pub async fn sync_datetime(&mut self) -> Result<()> {
        let now = chrono::Local::now().naive_local();
        self.set_datetime(&now).await
    }

    /// Reads the action stored in slot `index`
    #[instrument(skip(self))]
    pub async fn get_action(&mut self, index: u16) -> Result<Action> {
        let mut response = [0u8; ACTION_RECORD_SIZE];
        self.exchange(Command::GetAction, &encode_index(index), &mut response)
            .await?;
        let action = Action::from_bytes(&response);
        trace!("Slot {} holds {}", index, action);
        Ok(action)
    }

    /// Stores `action` in slot `index`
    #[instrument(skip(self, action), fields(action = %action))]
    pub async fn set_action(&mut self, index: u16, action: &Action) -> Result<()> {
        let mut payload = [0u8; 2 + ACTION_RECORD_SIZE];
        payload[..2].copy_from_slice(&encode_index(index));
        payload[2..].copy_from_slice(&action.to_bytes());

        trace!("Writing slot {}", index);
        self.status_command(Command::SetAction, &payload).await
    }

    /// Switches a unit immediately, bypassing the schedule
    ///
    /// # Arguments
    ///
    /// * `major` - Group identifier (ASCII)
    /// * `minor` - Unit within the group
    /// * `command` - 0 = off, 1 = on
    #[instrument(skip(self))]
    pub async fn switch(&mut self, major: char, minor: u8, command: u8) -> Result<()> {
        if !major.is_ascii() {
            return Err(Error::Validation(format!(
                "major {:?} is not an ASCII character",
                major
            )));
        }

        debug!("Switching {}{} with command {}", major, minor, command);
        self.status_command(Command::Switch, &[major as u8, minor, command])
            .await?;
        info!("Switched {}{} with command {}", major, minor, command);
        Ok(())
    }

    /// Queries the appliance capabilities
    #[instrument(skip(self))]
    pub async fn get_info(&mut self) -> Result<DeviceInfo> {
        let mut response = [0u8; INFO_RECORD_SIZE];
        self.exchange(Command::GetInfo, &[], &mut response).await?;
        let info = DeviceInfo::from_bytes(&response)?;
        debug!(
            "Device hw={} sw={} memory={} actions={}",
            info.hw_version, info.sw_version, info.memory_size, info.action_count
        );
        Ok(info)
    }

    /// Provisions the appliance memory layout
    ///
    /// Manufacturer only. The device sends no reply and waits for a manual
    /// reset afterwards. Only available with the `provisioning` feature.
    #[cfg(feature = "provisioning")]
    #[instrument(skip(self))]
    pub async fn set_info(&mut self, info: &ProvisionInfo) -> Result<()> {
        warn!("Provisioning device memory: {:?}", info);
        self.exchange(Command::SetInfo, &info.to_bytes(), &mut [])
            .await
    }

    /// Provisioning is compiled out; always fails with [`Error::NotSupported`]
    #[cfg(not(feature = "provisioning"))]
    #[instrument(skip(self))]
    pub async fn set_info(&mut self, info: &ProvisionInfo) -> Result<()> {
        warn!("Refusing to provision device memory: {:?}", info);
        Err(Error::NotSupported("set_info"))
    }

    /// Enables debug output on the device's serial line
    #[instrument(skip(self))]
    pub async fn set_verbose(&mut self) -> Result<()> {
        self.status_command(Command::SetVerbose, &[]).await?;
        warn!("Device verbose output enabled; further responses may carry debug text");
        Ok(())
    }

    /// Requests a hardware reset. The device does not answer.
    #[instrument(skip(self))]
    pub async fn reset(&mut self) -> Result<()> {
        self.exchange(Command::Reset, &[], &mut []).await?;
        info!("Reset requested, the device may wait for its reset button");
        Ok(())
    }

    /// Sends a command expecting a one-byte status answer
    async fn status_command(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        let mut status = [0u8; 1];
        self.exchange(command, payload, &mut status).await?;
        check_status(command, status[0]).inspect_err(|e| warn!("{}", e))
    }

    /// Writes the command code and payload, then reads exactly `response.len()` bytes
    async fn exchange(
        &mut self,
        command: Command,
        payload: &[u8],
        response: &mut [u8],
    ) -> Result<()> {
        trace!(
            "Sending {} with {} payload bytes, expecting {}",
            command,
            payload.len(),
            response.len()
        );

        let result = async {
            self.transport.write_all(&[command.code()]).await?;
            if !payload.is_empty() {
                self.transport.write_all(payload).await?;
            }
            if !response.is_empty() {
                self.transport.read_exact(response).await?;
            }
            Ok::<(), Error>(())
        }
        .await;

        result.map_err(|e| {
            error!("{} failed on {}: {}", command, self.transport.name(), e);
            Error::Command {
                command,
                source: Box::new(e),
            }
        })
    }
}
