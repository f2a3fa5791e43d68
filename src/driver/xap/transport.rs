//! byte level half-duplex link to a unit, no protocol knowledge

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::common::error::XapError;
use crate::{debug, info};

const LOG_TAG: &str = "transport.rs | xap serial link";

#[async_trait]
pub trait Transport: Send {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// read whatever arrived, `Ok(0)` once the read timeout passes with nothing received
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    async fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct SerialTransport {
    port_name: String,
    stream: SerialStream,
    read_timeout: Duration,
}

impl SerialTransport {
    pub fn open(port_name: &str, baudrate: u32, read_timeout: Duration) -> Result<Self, XapError> {
        let stream = tokio_serial::new(port_name, baudrate)
            .timeout(read_timeout)
            .open_native_async()
            .map_err(|e| XapError::Open {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;
        info!(LOG_TAG, "serial port {} opened at {} baud", port_name, baudrate);
        Ok(SerialTransport {
            port_name: port_name.to_string(),
            stream,
            read_timeout,
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match tokio::time::timeout(self.read_timeout, self.stream.read(buf)).await {
            Ok(read) => read,
            Err(_) => Ok(0),
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        debug!(LOG_TAG, "closing serial port {}", self.port_name);
        self.stream.shutdown().await
    }
}
