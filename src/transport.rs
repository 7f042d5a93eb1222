/*!
 # Byte transport to the appliance

 The driver only needs exact reads and full writes, so any byte stream can
 stand in for the serial port (the test suite uses an in-memory device).
*/

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialPortType, SerialStream, StopBits,
};
use tracing::{debug, info, instrument, trace};

use crate::{Error, Result};

/// Line speed of the appliance
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// How long a complete response may take to arrive
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// A blocking-style byte stream with exact reads
#[async_trait]
pub trait Transport: Send {
    /// Fills `buf` completely or fails; a short read is an error
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Writes all of `data`
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Releases the underlying stream. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Human readable name of the endpoint, for logs
    fn name(&self) -> &str {
        "transport"
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact(buf).await
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Serial line settings
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    pub baud_rate: u32,
    /// Deadline for one complete response
    pub read_timeout: Duration,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port = if cfg!(windows) { "COM1" } else { "/dev/ttyUSB0" };
        Self {
            port: port.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// The appliance's serial port: 8 data bits, no parity, 1 stop bit, no flow control
pub struct SerialTransport {
    port: Option<SerialStream>,
    name: String,
    read_timeout: Duration,
}

impl SerialTransport {
    /// Opens and configures the port
    #[instrument]
    pub fn open(config: &SerialConfig) -> Result<Self> {
        debug!("Opening serial port");
        let port = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open_native_async()
            .map_err(|e| Error::Connection {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        info!(
            "Opened serial port {} at {} baud",
            config.port, config.baud_rate
        );

        Ok(Self {
            port: Some(port),
            name: config.port.clone(),
            read_timeout: config.read_timeout,
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        let deadline = Instant::now() + self.read_timeout;
        let expected = buf.len();
        let mut received = 0;

        while received < expected {
            match timeout_at(deadline, port.read(&mut buf[received..])).await {
                // EOF before the response was complete
                Ok(Ok(0)) | Err(_) => return Err(Error::Timeout { expected, received }),
                Ok(Ok(n)) => received += n,
                Ok(Err(e)) => return Err(Error::Io(e)),
            }
        }

        trace!("Received {:02x?}", buf);
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        trace!("Sending {:02x?}", data);
        port.write_all(data).await?;
        port.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.name);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A serial port present on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    /// USB (with VID:PID), PCI, Bluetooth or Native
    pub kind: String,
}

/// Lists the serial ports the operating system reports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = tokio_serial::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let kind = match &p.port_type {
                SerialPortType::UsbPort(usb) => {
                    format!("USB ({:04X}:{:04X})", usb.vid, usb.pid)
                }
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::Unknown => "Native".to_string(),
            };
            PortInfo {
                name: p.port_name,
                kind,
            }
        })
        .collect())
}
