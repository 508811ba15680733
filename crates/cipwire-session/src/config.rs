use std::time::Duration;

use cipwire_cip::connection_manager::{
    DEFAULT_O_T_RPI, DEFAULT_ORIGINATOR_SERIAL, DEFAULT_TIMEOUT_MULTIPLIER,
    DEFAULT_TRANSPORT_CLASS_TRIGGER, DEFAULT_T_O_RPI, DEFAULT_VENDOR_ID,
};
use cipwire_cip::{ConnectionDescriptor, EPath, NetworkConnectionParameters, Timing};
use serde::{Deserialize, Serialize};

/// Connection sizes above this need a Large Forward Open.
pub const DEFAULT_LARGE_FORWARD_OPEN_THRESHOLD: u16 = 511;

/// Configuration for a [`Client`](crate::Client) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline for each request/reply exchange, unconnected or connected.
    pub timeout: Duration,
    /// Originator vendor id sent in Forward Open / Forward Close.
    pub vendor_id: u16,
    /// Originator serial number sent in Forward Open / Forward Close.
    pub originator_serial: u32,
    pub timeout_multiplier: u8,
    /// Requested packet interval, originator to target, in microseconds.
    pub o_t_rpi: u32,
    /// Requested packet interval, target to originator, in microseconds.
    pub t_o_rpi: u32,
    pub transport_class_trigger: u8,
    /// Connection size in bytes for both directions.
    pub connection_size: u16,
    /// Largest connection size opened with a plain Forward Open.
    pub large_forward_open_threshold: u16,
    /// Connection Manager timing for Unconnected Send and Forward Open.
    pub timing: Timing,
}

impl SessionConfig {
    /// Connection descriptor for opening a connection along `route`.
    pub fn descriptor(&self, route: EPath) -> ConnectionDescriptor {
        let parameters = NetworkConnectionParameters::point_to_point(self.connection_size);
        ConnectionDescriptor {
            vendor_id: self.vendor_id,
            originator_serial: self.originator_serial,
            o_t_rpi: self.o_t_rpi,
            t_o_rpi: self.t_o_rpi,
            timeout_multiplier: self.timeout_multiplier,
            transport_class_trigger: self.transport_class_trigger,
            o_t_parameters: parameters,
            t_o_parameters: parameters,
            large: self.connection_size > self.large_forward_open_threshold,
            timing: self.timing,
            ..ConnectionDescriptor::new(route)
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            vendor_id: DEFAULT_VENDOR_ID,
            originator_serial: DEFAULT_ORIGINATOR_SERIAL,
            timeout_multiplier: DEFAULT_TIMEOUT_MULTIPLIER,
            o_t_rpi: DEFAULT_O_T_RPI,
            t_o_rpi: DEFAULT_T_O_RPI,
            transport_class_trigger: DEFAULT_TRANSPORT_CLASS_TRIGGER,
            connection_size: 500,
            large_forward_open_threshold: DEFAULT_LARGE_FORWARD_OPEN_THRESHOLD,
            timing: Timing::DEFAULT,
        }
    }
}
