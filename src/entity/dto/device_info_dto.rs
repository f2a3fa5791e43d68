use serde::Serialize;

/// identity read from the unit at construction plus the model's advertised channel counts
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfoDto {
    pub id: u8,
    #[serde(rename = "type")]
    pub device_type: String,
    pub uid: String,
    pub version: String,
    pub inputs: i32,
    pub outputs: i32,
}
