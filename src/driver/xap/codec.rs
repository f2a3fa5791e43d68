//! XAP ASCII command codec
//!
//! request:  `#<type><id> <COMMAND>[ <arg>]*\r\n`
//! response: `#<type><id> <field> <field> ...` ended by `\n`, `\0`, a read timeout or a full buffer
//!
//! the payload handed to callers is everything after the 3 byte header, trimmed.
//! a payload carrying `ERROR <msg>` is a device-reported failure.

use tokio_util::{
    bytes::{BufMut, BytesMut},
    codec::{Decoder, Encoder},
};

use super::entity::DeviceType;
use crate::common::error::XapError;

/// receive buffer capacity for one response
pub const RECV_BUF_SIZE: usize = 128;

const START: u8 = b'#';
const HEADER_LEN: usize = 3;
const ERROR_MARKER: &str = "ERROR ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ver,
    Uid,
    Mute,
    Label,
    Gain,
    Lvl,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ver => "VER",
            Command::Uid => "UID",
            Command::Mute => "MUTE",
            Command::Label => "LABEL",
            Command::Gain => "GAIN",
            Command::Lvl => "LVL",
        }
    }

    /// (token count of the echo, index of the value token)
    fn shape(&self) -> Option<(usize, usize)> {
        match self {
            Command::Mute => Some((4, 3)),
            Command::Label => Some((5, 3)),
            Command::Gain => Some((5, 3)),
            Command::Lvl => Some((5, 4)),
            Command::Ver | Command::Uid => None,
        }
    }
}

/// one outgoing command, args are positional and may be empty
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub command: Command,
    pub args: &'a [&'a str],
}

/// frames requests for, and extracts responses from, one addressed unit
#[derive(Debug, Clone, Copy)]
pub struct XapCodec {
    device_type: DeviceType,
    device_id: u8,
}

impl XapCodec {
    pub fn new(device_type: DeviceType, device_id: u8) -> Self {
        XapCodec {
            device_type,
            device_id,
        }
    }
}

impl<'a> Encoder<Request<'a>> for XapCodec {
    type Error = XapError;

    fn encode(&mut self, item: Request<'a>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(START);
        dst.put_u8(b'0' + self.device_type.digit());
        dst.put_u8(b'0' + self.device_id);
        dst.put_u8(b' ');
        dst.put_slice(item.command.name().as_bytes());
        for arg in item.args {
            dst.put_u8(b' ');
            dst.put_slice(arg.as_bytes());
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

impl Decoder for XapCodec {
    type Item = String;
    type Error = XapError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut start = None;
        let mut end = None;
        for (i, b) in buf.iter().enumerate() {
            match *b {
                START if start.is_none() => start = Some(i),
                b'\n' if start.is_some() => {
                    end = Some(i);
                    break;
                }
                0 => {
                    end = Some(i);
                    break;
                }
                _ => {}
            }
        }

        match (start, end) {
            (Some(start), Some(end)) => {
                let frame = buf.split_to(end + 1);
                payload(&frame[start..]).map(Some)
            }
            // terminated before any start marker
            (None, Some(_)) => {
                buf.clear();
                Err(XapError::NoResponse)
            }
            _ => Ok(None),
        }
    }

    /// the link went quiet (read timeout) or the buffer filled up: whatever follows `#` is the frame
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload) = self.decode(buf)? {
            return Ok(Some(payload));
        }
        let frame = buf.split();
        match frame.iter().position(|b| *b == START) {
            Some(start) => payload(&frame[start..]).map(Some),
            None => Err(XapError::NoResponse),
        }
    }
}

/// strip the header and check for a device-reported error
fn payload(frame: &[u8]) -> Result<String, XapError> {
    if frame.len() < HEADER_LEN {
        return Err(XapError::InvalidResponse);
    }
    let text = String::from_utf8_lossy(&frame[HEADER_LEN..]);
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if let Some(i) = text.find(ERROR_MARKER) {
        return Err(XapError::Device(text[i + ERROR_MARKER.len()..].to_string()));
    }
    Ok(text.to_string())
}

/// split a payload on single spaces, checking the token count `command` echoes
pub fn fields(command: Command, payload: &str) -> Result<Vec<&str>, XapError> {
    let tokens: Vec<&str> = payload.split(' ').collect();
    match command.shape() {
        Some((count, _)) if tokens.len() != count => Err(XapError::InvalidResponse),
        _ => Ok(tokens),
    }
}

/// the value token of a `command` echo
pub fn value(command: Command, payload: &str) -> Result<&str, XapError> {
    let (_, index) = command.shape().ok_or(XapError::InvalidResponse)?;
    let tokens = fields(command, payload)?;
    Ok(tokens[index])
}

pub fn parse_f32(field: &'static str, raw: &str) -> Result<f32, XapError> {
    raw.parse::<f32>().map_err(|_| XapError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}
