//! Radio transports for the cube link.
//!
//! A transport opens a GATT session with the cube and relays its encrypted
//! notifications and commands; decryption stays with the link. The radio
//! supported here is a small BLE bridge on a serial port, framed as
//! `[kind][len][payload]`:
//!
//! | kind | direction     | payload                              |
//! |------|---------------|--------------------------------------|
//! | 0x01 | bridge → host | encrypted cube notification          |
//! | 0x02 | bridge → host | heartbeat, empty                     |
//! | 0x03 | bridge → host | link lost, empty                     |
//! | 0x04 | bridge → host | linked, address of the selected cube |
//! | 0x10 | host → bridge | select, cube address (or none)       |
//! | 0x11 | host → bridge | write, encrypted cube command        |

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::{Decoder, Encoder, Framed};

use super::LinkError;
use crate::tracing::prelude::*;

/// Without even a heartbeat for this long, the link is considered lost.
pub const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

const BRIDGE_BAUD: u32 = 115_200;

/// Something that can open a session with the cube.
#[async_trait]
pub trait CubeTransport: Send + Sync {
    /// Open a session with the cube at `address`, or with whichever cube the
    /// radio finds first when `None`. Callers bound this with a timeout.
    async fn connect(&self, address: Option<&str>) -> Result<Box<dyn CubeConnection>, LinkError>;
}

/// An open session with the cube.
#[async_trait]
pub trait CubeConnection: Send {
    /// Hardware address of the connected cube. It keys the frame cipher.
    fn address(&self) -> &str;

    /// Next encrypted cube notification. `Ok(None)` means the peer closed
    /// cleanly.
    async fn next_frame(&mut self) -> Result<Option<Bytes>, LinkError>;

    /// Write an encrypted command to the cube.
    async fn send(&mut self, frame: Bytes) -> Result<(), LinkError>;

    /// Tear the session down.
    async fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeFrame {
    Cube(Bytes),
    Heartbeat,
    Lost,
    Linked(Bytes),
    Select(Bytes),
    Write(Bytes),
}

impl BridgeFrame {
    const CUBE: u8 = 0x01;
    const HEARTBEAT: u8 = 0x02;
    const LOST: u8 = 0x03;
    const LINKED: u8 = 0x04;
    const SELECT: u8 = 0x10;
    const WRITE: u8 = 0x11;

    fn kind(&self) -> u8 {
        match self {
            BridgeFrame::Cube(_) => Self::CUBE,
            BridgeFrame::Heartbeat => Self::HEARTBEAT,
            BridgeFrame::Lost => Self::LOST,
            BridgeFrame::Linked(_) => Self::LINKED,
            BridgeFrame::Select(_) => Self::SELECT,
            BridgeFrame::Write(_) => Self::WRITE,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            BridgeFrame::Cube(p)
            | BridgeFrame::Linked(p)
            | BridgeFrame::Select(p)
            | BridgeFrame::Write(p) => p,
            BridgeFrame::Heartbeat | BridgeFrame::Lost => &[],
        }
    }
}

/// Length-prefixed framing of the bridge serial line.
#[derive(Debug, Default)]
pub struct BridgeCodec;

impl Decoder for BridgeCodec {
    type Item = BridgeFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }
        let kind = src[0];
        let len = usize::from(src[1]);
        if src.len() < 2 + len {
            src.reserve(2 + len - src.len());
            return Ok(None);
        }

        src.advance(2);
        let payload = src.split_to(len).freeze();

        let frame = match kind {
            BridgeFrame::CUBE => BridgeFrame::Cube(payload),
            BridgeFrame::HEARTBEAT => BridgeFrame::Heartbeat,
            BridgeFrame::LOST => BridgeFrame::Lost,
            BridgeFrame::LINKED => BridgeFrame::Linked(payload),
            BridgeFrame::SELECT => BridgeFrame::Select(payload),
            BridgeFrame::WRITE => BridgeFrame::Write(payload),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown bridge frame kind {other:#04x}"),
                ));
            }
        };
        Ok(Some(frame))
    }
}

impl Encoder<BridgeFrame> for BridgeCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: BridgeFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = frame.payload();
        let len = u8::try_from(payload.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "bridge payload over 255 bytes")
        })?;
        dst.reserve(2 + payload.len());
        dst.put_u8(frame.kind());
        dst.put_u8(len);
        dst.put_slice(payload);
        Ok(())
    }
}

/// Cube radio behind a serial-attached bridge.
#[derive(Debug, Clone)]
pub struct SerialBridge {
    port: String,
}

impl SerialBridge {
    pub fn new(port: impl Into<String>) -> Self {
        Self { port: port.into() }
    }
}

#[async_trait]
impl CubeTransport for SerialBridge {
    async fn connect(&self, address: Option<&str>) -> Result<Box<dyn CubeConnection>, LinkError> {
        let stream = tokio_serial::new(&self.port, BRIDGE_BAUD).open_native_async()?;
        let mut framed = Framed::new(stream, BridgeCodec);

        let select = Bytes::copy_from_slice(address.unwrap_or_default().as_bytes());
        framed.send(BridgeFrame::Select(select)).await?;
        debug!(port = %self.port, address = address.unwrap_or("any"), "Cube selected on bridge");

        let linked = loop {
            match framed.next().await {
                Some(Ok(BridgeFrame::Linked(reported))) => break reported,
                Some(Ok(BridgeFrame::Lost)) => return Err(LinkError::Lost),
                Some(Ok(other)) => trace!(?other, "Ignoring bridge frame before link"),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(LinkError::Bridge("port closed during connect".into())),
            }
        };

        // The bridge names the cube it picked; fall back to the one asked for.
        let address = match std::str::from_utf8(&linked) {
            Ok(reported) if !reported.is_empty() => reported.to_string(),
            _ => address
                .map(str::to_string)
                .ok_or_else(|| LinkError::Bridge("bridge did not report the cube address".into()))?,
        };
        debug!(port = %self.port, %address, "Bridge linked");

        Ok(Box::new(BridgeConnection { framed, address }))
    }
}

struct BridgeConnection {
    framed: Framed<SerialStream, BridgeCodec>,
    address: String,
}

#[async_trait]
impl CubeConnection for BridgeConnection {
    fn address(&self) -> &str {
        &self.address
    }

    async fn next_frame(&mut self) -> Result<Option<Bytes>, LinkError> {
        read_cube_frame(&mut self.framed).await
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), LinkError> {
        self.framed.send(BridgeFrame::Write(frame)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.framed.close().await {
            debug!(error = %e, "Closing bridge port");
        }
    }
}

/// Read until the next cube frame, skipping heartbeats.
async fn read_cube_frame<S>(frames: &mut S) -> Result<Option<Bytes>, LinkError>
where
    S: futures::Stream<Item = io::Result<BridgeFrame>> + Unpin,
{
    loop {
        let next = tokio::time::timeout(READ_IDLE_TIMEOUT, frames.next())
            .await
            .map_err(|_| LinkError::ReadTimeout(READ_IDLE_TIMEOUT))?;

        match next {
            Some(Ok(BridgeFrame::Cube(frame))) => return Ok(Some(frame)),
            Some(Ok(BridgeFrame::Heartbeat | BridgeFrame::Linked(_))) => continue,
            Some(Ok(BridgeFrame::Lost)) => return Err(LinkError::Lost),
            Some(Ok(BridgeFrame::Select(_) | BridgeFrame::Write(_))) => {
                return Err(LinkError::Bridge("host frame received from bridge".into()));
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(None),
        }
    }
}
