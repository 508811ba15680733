//! CIP object class codes.

pub const IDENTITY: u16 = 0x01;
pub const MESSAGE_ROUTER: u16 = 0x02;
pub const DEVICENET: u16 = 0x03;
pub const ASSEMBLY: u16 = 0x04;
pub const CONNECTION: u16 = 0x05;
pub const CONNECTION_MANAGER: u16 = 0x06;
pub const REGISTER: u16 = 0x07;
pub const PARAMETER: u16 = 0x0F;
pub const PARAMETER_GROUP: u16 = 0x10;
pub const GROUP: u16 = 0x12;
pub const FILE: u16 = 0x37;
pub const EVENT_LOG: u16 = 0x41;
pub const MOTION_AXIS: u16 = 0x42;
pub const TIME_SYNC: u16 = 0x43;
pub const MODBUS: u16 = 0x44;
pub const PCCC: u16 = 0x67;
pub const SYMBOL: u16 = 0x6B;
pub const TEMPLATE: u16 = 0x6C;
pub const NON_VOLATILE_STORAGE: u16 = 0xA1;
pub const CONTROLNET: u16 = 0xF0;
pub const CONNECTION_CONFIGURATION: u16 = 0xF3;
pub const PORT: u16 = 0xF4;
pub const TCPIP_INTERFACE: u16 = 0xF5;
pub const ETHERNET_LINK: u16 = 0xF6;

/// Returns the object name for a class code.
pub fn class_name(code: u16) -> Option<&'static str> {
    let name = match code {
        IDENTITY => "Identity",
        MESSAGE_ROUTER => "Message Router",
        DEVICENET => "DeviceNet",
        ASSEMBLY => "Assembly",
        CONNECTION => "Connection",
        CONNECTION_MANAGER => "Connection Manager",
        REGISTER => "Register",
        PARAMETER => "Parameter",
        PARAMETER_GROUP => "Parameter Group",
        GROUP => "Group",
        FILE => "File",
        EVENT_LOG => "Event Log",
        MOTION_AXIS => "Motion Axis",
        TIME_SYNC => "Time Sync",
        MODBUS => "Modbus",
        PCCC => "PCCC",
        SYMBOL => "Symbol",
        TEMPLATE => "Template",
        NON_VOLATILE_STORAGE => "Non-Volatile Storage",
        CONTROLNET => "ControlNet",
        CONNECTION_CONFIGURATION => "Connection Configuration",
        PORT => "Port",
        TCPIP_INTERFACE => "TCP/IP Interface",
        ETHERNET_LINK => "Ethernet Link",
        _ => return None,
    };
    Some(name)
}
