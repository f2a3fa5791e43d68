pub mod device_info_dto;
pub mod device_state_dto;
