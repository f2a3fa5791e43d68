use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// XAP family hardware model, the discriminant is the digit used on the wire
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    PSR1212 = 4,
    XAP800 = 5,
    XAPTH2 = 6,
    XAP400 = 7,
}

impl DeviceType {
    pub fn digit(&self) -> u8 {
        *self as u8
    }

    /// advertised input channel count, -1 when the model does not report one
    pub fn inputs(&self) -> i32 {
        match self {
            DeviceType::XAP800 => 12,
            DeviceType::XAP400 => 8,
            DeviceType::XAPTH2 => 0,
            DeviceType::PSR1212 => -1,
        }
    }

    /// advertised output channel count, -1 when the model does not report one
    pub fn outputs(&self) -> i32 {
        match self {
            DeviceType::XAP800 => 12,
            DeviceType::XAP400 => 9,
            DeviceType::XAPTH2 => 0,
            DeviceType::PSR1212 => -1,
        }
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            DeviceType::PSR1212 => "PSR1212",
            DeviceType::XAP800 => "XAP800",
            DeviceType::XAPTH2 => "XAPTH2",
            DeviceType::XAP400 => "XAP400",
        };
        f.write_str(name)
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PSR1212" => Ok(DeviceType::PSR1212),
            "XAP800" => Ok(DeviceType::XAP800),
            "XAPTH2" => Ok(DeviceType::XAPTH2),
            "XAP400" => Ok(DeviceType::XAP400),
            _ => Err(format!("unknown device type '{}'", s)),
        }
    }
}

/// channel direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Input,
    Output,
}

impl Group {
    pub const ALL: [Group; 2] = [Group::Input, Group::Output];

    /// group letter used inside commands
    pub fn code(&self) -> &'static str {
        match self {
            Group::Input => "I",
            Group::Output => "O",
        }
    }
}

impl Display for Group {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Group {
    type Err = String;

    /// accepts the wire letter or the json name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" | "i" | "input" => Ok(Group::Input),
            "O" | "o" | "output" => Ok(Group::Output),
            _ => Err(format!("unknown group '{}'", s)),
        }
    }
}

/// what a failed initial channel refresh does to device construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitPolicy {
    /// construction fails on the first channel that cannot be read
    Abort,
    /// failed channels are logged and keep default cached state
    Tolerate,
}
