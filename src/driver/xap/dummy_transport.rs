//! in-process simulated XAP unit
//! answers VER UID MUTE LABEL GAIN LVL the way the hardware does, used for dummy mode and tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::entity::{DeviceType, Group};
use super::transport::Transport;
use crate::{debug, trace};

const LOG_TAG: &str = "dummy_transport.rs | simulated xap";

const GAIN_MIN: f32 = -65.0;
const GAIN_MAX: f32 = 20.0;

#[derive(Debug, Clone)]
struct SimChannel {
    label: String,
    muted: bool,
    gain: f32,
    level: f32,
}

/// frames written to a [`DummyXap`], without the trailing CRLF
pub type Journal = Arc<Mutex<Vec<String>>>;

pub struct DummyXap {
    device_type: DeviceType,
    device_id: u8,
    version: String,
    uid: String,
    channels: HashMap<(Group, u32), SimChannel>,
    // commands answered with `ERROR <msg>`
    faults: HashMap<String, String>,
    // commands left unanswered
    silent: HashSet<String>,
    pending: VecDeque<u8>,
    journal: Journal,
}

impl DummyXap {
    pub fn new(device_type: DeviceType, device_id: u8, inputs: u32, outputs: u32) -> Self {
        let mut channels = HashMap::new();
        for (group, count) in [(Group::Input, inputs), (Group::Output, outputs)] {
            for number in 1..=count {
                let level = -40.0 + number as f32;
                channels.insert(
                    (group, number),
                    SimChannel {
                        label: format!("{}{}", group.code(), number),
                        muted: false,
                        gain: 0.0,
                        level,
                    },
                );
            }
        }
        DummyXap {
            device_type,
            device_id,
            version: String::from("3.0.1"),
            uid: format!("0x{:08X}", 0x4D5A_3C00u32 + device_id as u32),
            channels,
            faults: HashMap::new(),
            silent: HashSet::new(),
            pending: VecDeque::new(),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// answer every `command` with `ERROR <msg>`
    #[cfg(test)]
    pub fn fail_command(mut self, command: &str, msg: &str) -> Self {
        self.faults.insert(command.to_string(), msg.to_string());
        self
    }

    /// never answer `command`, as a unit that lost the frame would
    #[cfg(test)]
    pub fn ignore_command(mut self, command: &str) -> Self {
        self.silent.insert(command.to_string());
        self
    }

    #[cfg(test)]
    pub fn with_muted(mut self, group: Group, number: u32) -> Self {
        if let Some(ch) = self.channels.get_mut(&(group, number)) {
            ch.muted = true;
        }
        self
    }

    #[cfg(test)]
    pub fn with_level(mut self, group: Group, number: u32, level: f32) -> Self {
        if let Some(ch) = self.channels.get_mut(&(group, number)) {
            ch.level = level;
        }
        self
    }

    /// (inputs, outputs) the simulated unit answers for
    #[cfg(test)]
    pub fn channel_counts(&self) -> (usize, usize) {
        let count = |group| self.channels.keys().filter(|(g, _)| *g == group).count();
        (count(Group::Input), count(Group::Output))
    }

    #[cfg(test)]
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn handle(&mut self, frame: &str) {
        let frame = frame.trim_end_matches(['\r', '\n']);
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(frame.to_string());
        }

        let header = format!("#{}{}", self.device_type.digit(), self.device_id);
        let body = match frame.strip_prefix(&header).and_then(|rest| rest.strip_prefix(' ')) {
            Some(body) => body,
            None => {
                trace!(LOG_TAG, "frame not addressed to this unit: {}", frame);
                return;
            }
        };

        let tokens: Vec<&str> = body.split(' ').collect();
        let command = tokens[0];
        if self.silent.contains(command) {
            return;
        }
        let fault = self.faults.get(command).cloned();
        let reply = match fault {
            Some(msg) => format!("ERROR {}", msg),
            None => self.execute(command, &tokens[1..]).unwrap_or_else(|msg| format!("ERROR {}", msg)),
        };
        debug!(LOG_TAG, "reply: {}", reply);
        self.pending.extend(format!("{} {}\r\n", header, reply).bytes());
    }

    fn execute(&mut self, command: &str, args: &[&str]) -> Result<String, String> {
        match command {
            "VER" => Ok(format!("VER {}", self.version)),
            "UID" => Ok(format!("UID {}", self.uid)),
            "MUTE" => {
                let (number, group, ch) = self.channel(args)?;
                match args.get(2).copied().unwrap_or("") {
                    "" => {}
                    "0" => ch.muted = false,
                    "1" => ch.muted = true,
                    _ => return Err(String::from("bad value")),
                }
                Ok(format!("MUTE {} {} {}", number, group.code(), if ch.muted { 1 } else { 0 }))
            }
            "LABEL" => {
                let (number, group, ch) = self.channel(args)?;
                Ok(format!("LABEL {} {} {} A", number, group.code(), ch.label))
            }
            "GAIN" => {
                let (number, group, ch) = self.channel(args)?;
                let value = args.get(2).copied().unwrap_or("");
                if !value.is_empty() {
                    let gain: f32 = value.parse().map_err(|_| String::from("bad value"))?;
                    ch.gain = gain.clamp(GAIN_MIN, GAIN_MAX);
                }
                Ok(format!("GAIN {} {} {:.2} A", number, group.code(), ch.gain))
            }
            "LVL" => {
                let (number, group, ch) = self.channel(args)?;
                let value = args.get(3).copied().unwrap_or("");
                if !value.is_empty() {
                    ch.level = value.parse().map_err(|_| String::from("bad value"))?;
                }
                Ok(format!("LVL {} {} A {:.1}", number, group.code(), ch.level))
            }
            _ => Err(String::from("unknown command")),
        }
    }

    fn channel(&mut self, args: &[&str]) -> Result<(u32, Group, &mut SimChannel), String> {
        let number: u32 = args
            .first()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| String::from("bad channel"))?;
        let group = match args.get(1).copied() {
            Some("I") => Group::Input,
            Some("O") => Group::Output,
            _ => return Err(String::from("bad group")),
        };
        let ch = self
            .channels
            .get_mut(&(group, number))
            .ok_or_else(|| String::from("bad channel"))?;
        Ok((number, group, ch))
    }
}

#[async_trait]
impl Transport for DummyXap {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(frame).to_string();
        self.handle(&text);
        Ok(())
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.pending.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exchange(xap: &mut DummyXap, frame: &str) -> String {
        xap.write_frame(frame.as_bytes()).await.unwrap();
        let mut buf = [0u8; 128];
        let n = xap.read_chunk(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    }

    #[tokio::test]
    async fn answers_identity_queries() {
        let mut xap = DummyXap::new(DeviceType::XAP800, 2, 12, 12);
        assert_eq!(exchange(&mut xap, "#52 VER\r\n").await, "#52 VER 3.0.1\r\n");
        assert!(exchange(&mut xap, "#52 UID\r\n").await.starts_with("#52 UID 0x"));
    }

    #[tokio::test]
    async fn echoes_set_commands() {
        let mut xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12);
        assert_eq!(exchange(&mut xap, "#50 MUTE 3 O 1\r\n").await, "#50 MUTE 3 O 1\r\n");
        assert_eq!(exchange(&mut xap, "#50 MUTE 3 O \r\n").await, "#50 MUTE 3 O 1\r\n");
        assert_eq!(
            exchange(&mut xap, "#50 GAIN 3 O 99.000000 A\r\n").await,
            "#50 GAIN 3 O 20.00 A\r\n"
        );
    }

    #[tokio::test]
    async fn reports_errors_like_the_hardware() {
        let mut xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12);
        assert_eq!(exchange(&mut xap, "#50 MUTE 13 I \r\n").await, "#50 ERROR bad channel\r\n");
        assert_eq!(exchange(&mut xap, "#50 FOO\r\n").await, "#50 ERROR unknown command\r\n");
    }

    #[tokio::test]
    async fn ignores_other_addresses() {
        let mut xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12);
        let journal = xap.journal();
        assert_eq!(exchange(&mut xap, "#51 VER\r\n").await, "");
        assert_eq!(*journal.lock().unwrap(), vec!["#51 VER".to_string()]);
    }

    #[tokio::test]
    async fn injected_faults() {
        let mut xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12)
            .fail_command("UID", "locked")
            .ignore_command("LABEL");
        assert_eq!(exchange(&mut xap, "#50 UID\r\n").await, "#50 ERROR locked\r\n");
        assert_eq!(exchange(&mut xap, "#50 LABEL 1 I \r\n").await, "");
    }
}
