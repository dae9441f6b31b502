pub mod frame;

use frame::{Command, FrameError, HEADER_LEN, MAX_FRAME, MAX_PAYLOAD};
pub use imu_traits::{ChannelKind, ChannelReadings, ImuError, SensorError, SensorSource, Vector3};
use log::{debug, warn};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::Duration;

const INTERNAL_CHANNELS: [ChannelKind; 3] = [
    ChannelKind::Accelerometer,
    ChannelKind::Gyroscope,
    ChannelKind::Magnetometer,
];

/// Byte stream the controller link runs over.
pub trait Transport: Read + Write {
    /// Drops unread input so the next response read belongs to the next request.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

#[derive(Debug)]
pub enum LinkError {
    Io(io::Error),
    Frame(FrameError),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::Io(e) => write!(f, "link I/O error: {}", e),
            LinkError::Frame(e) => write!(f, "bad frame: {}", e),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<io::Error> for LinkError {
    fn from(err: io::Error) -> Self {
        LinkError::Io(err)
    }
}

impl From<FrameError> for LinkError {
    fn from(err: FrameError) -> Self {
        LinkError::Frame(err)
    }
}

impl From<LinkError> for ImuError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Io(e) => ImuError::DeviceError(format!("Serial error: {}", e)),
            LinkError::Frame(e) => ImuError::ReadError(e.to_string()),
        }
    }
}

/// Request/response client for the onboard controller.
pub struct PlinkLink<T: Transport> {
    transport: T,
    read_timeout: Duration,
    tx: [u8; MAX_FRAME],
    rx: [u8; MAX_FRAME],
}

impl PlinkLink<Box<dyn SerialPort>> {
    pub fn open(interface: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, ImuError> {
        let port = serialport::new(interface, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| ImuError::DeviceError(format!("Failed to open {}: {}", interface, e)))?;
        debug!("Opened controller link on {} at {} baud", interface, baud_rate);
        Ok(PlinkLink::new(port, read_timeout))
    }
}

impl<T: Transport> PlinkLink<T> {
    /// `read_timeout` must match the timeout the transport itself enforces; it is
    /// only used to label timeout errors.
    pub fn new(transport: T, read_timeout: Duration) -> Self {
        PlinkLink {
            transport,
            read_timeout,
            tx: [0u8; MAX_FRAME],
            rx: [0u8; MAX_FRAME],
        }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Sends one request and returns the payload of the matching response.
    ///
    /// Anything already waiting on the port belongs to an earlier request (a
    /// reply that came in after its timeout, the tail of a bad frame) and is
    /// dropped before the request goes out.
    fn transact(&mut self, command: Command, payload: &[u8]) -> Result<&[u8], LinkError> {
        self.transport.discard_input()?;
        let n = frame::encode(command, payload, &mut self.tx);
        self.transport.write_all(&self.tx[..n])?;
        self.transport.flush()?;

        let len = self.receive(command)?;
        Ok(&self.rx[HEADER_LEN..HEADER_LEN + len])
    }

    fn receive(&mut self, command: Command) -> Result<usize, LinkError> {
        let mut header = [0u8; HEADER_LEN];
        self.transport.read_exact(&mut header)?;
        let len = frame::check_header(&header, command)?;
        let body = &mut self.rx[HEADER_LEN..HEADER_LEN + len + 1];
        self.transport.read_exact(body)?;
        frame::check_body(&header, body)?;
        self.rx[..HEADER_LEN].copy_from_slice(&header);
        Ok(len)
    }

    pub fn ping(&mut self) -> Result<(), LinkError> {
        self.transact(Command::Ping, &[])?;
        Ok(())
    }

    pub fn read_imu(&mut self) -> Result<[Vector3; 3], LinkError> {
        let payload = self.transact(Command::ReadImu, &[])?;
        Ok(frame::decode_imu(payload)?)
    }

    /// Sets the output level (0.0 ..= 1.0) of one power channel on the controller.
    pub fn set_channel_power(&mut self, channel: u8, level: f32) -> Result<(), LinkError> {
        let level = level.clamp(0.0, 1.0);
        let mut payload = [0u8; 5];
        payload[0] = channel;
        payload[1..].copy_from_slice(&level.to_le_bytes());
        debug_assert!(payload.len() <= MAX_PAYLOAD);
        self.transact(Command::SetPower, &payload)?;
        Ok(())
    }
}

/// Maps a link failure onto the per-read error taxonomy.
pub fn to_sensor_error(err: LinkError, timeout: Duration) -> SensorError {
    match err {
        LinkError::Io(e) => match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => SensorError::Timeout(timeout),
            _ => SensorError::TransportDisconnected(e.to_string()),
        },
        LinkError::Frame(e) => SensorError::MalformedReading(e.to_string()),
    }
}

/// The controller's onboard IMU, sampled over the link.
pub struct RemoteImu<T: Transport = Box<dyn SerialPort>> {
    name: String,
    link: PlinkLink<T>,
}

impl RemoteImu<Box<dyn SerialPort>> {
    pub fn connect(interface: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, ImuError> {
        let link = PlinkLink::open(interface, baud_rate, read_timeout)?;
        RemoteImu::new(link)
    }
}

impl<T: Transport> RemoteImu<T> {
    /// Wraps an open link; the controller must answer a ping within three tries.
    pub fn new(mut link: PlinkLink<T>) -> Result<Self, ImuError> {
        let mut last_err = None;
        for attempt in 1..=3 {
            match link.ping() {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e) => {
                    warn!("Controller ping attempt {} failed: {}", attempt, e);
                    last_err = Some(e);
                }
            }
        }
        if let Some(e) = last_err {
            return Err(e.into());
        }
        Ok(RemoteImu {
            name: "internal".to_string(),
            link,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn set_channel_power(&mut self, channel: u8, level: f32) -> Result<(), ImuError> {
        self.link.set_channel_power(channel, level)?;
        debug!("Controller channel {} power set to {}", channel, level);
        Ok(())
    }
}

impl<T: Transport> SensorSource for RemoteImu<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn channels(&self) -> &[ChannelKind] {
        &INTERNAL_CHANNELS
    }

    fn read(&mut self) -> Result<ChannelReadings, SensorError> {
        let timeout = self.link.read_timeout();
        let [accel, gyro, mag] = self
            .link
            .read_imu()
            .map_err(|e| to_sensor_error(e, timeout))?;
        Ok(ChannelReadings {
            accelerometer: Some(accel),
            gyroscope: Some(gyro),
            magnetometer: Some(mag),
        })
    }
}
