//! device management
//! - build devices from the settings
//! - keep them in a registry for the http layer
//! - refresh channel levels in the background

pub mod device_factory;
pub mod device_registry;
pub mod workers;
