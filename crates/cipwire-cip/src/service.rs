//! Common CIP service codes.

pub const GET_ATTRIBUTES_ALL: u8 = 0x01;
pub const SET_ATTRIBUTES_ALL: u8 = 0x02;
pub const GET_ATTRIBUTE_LIST: u8 = 0x03;
pub const SET_ATTRIBUTE_LIST: u8 = 0x04;
pub const RESET: u8 = 0x05;
pub const START: u8 = 0x06;
pub const STOP: u8 = 0x07;
pub const CREATE: u8 = 0x08;
pub const DELETE: u8 = 0x09;
pub const MULTIPLE_SERVICE_PACKET: u8 = 0x0A;
pub const APPLY_ATTRIBUTES: u8 = 0x0D;
pub const GET_ATTRIBUTE_SINGLE: u8 = 0x0E;
pub const SET_ATTRIBUTE_SINGLE: u8 = 0x10;
pub const FIND_NEXT_OBJECT_INSTANCE: u8 = 0x11;
pub const RESTORE: u8 = 0x15;
pub const SAVE: u8 = 0x16;
pub const NO_OPERATION: u8 = 0x17;
pub const GET_MEMBER: u8 = 0x18;
pub const SET_MEMBER: u8 = 0x19;
pub const INSERT_MEMBER: u8 = 0x1A;
pub const REMOVE_MEMBER: u8 = 0x1B;
pub const GROUP_SYNC: u8 = 0x1C;

/// Bit set in the service code of every reply.
pub const REPLY_MASK: u8 = 0x80;

/// Returns the name of a common service. Object-specific codes (0x32 and up)
/// are not covered.
pub fn service_name(code: u8) -> Option<&'static str> {
    let name = match code & !REPLY_MASK {
        GET_ATTRIBUTES_ALL => "Get_Attributes_All",
        SET_ATTRIBUTES_ALL => "Set_Attributes_All",
        GET_ATTRIBUTE_LIST => "Get_Attribute_List",
        SET_ATTRIBUTE_LIST => "Set_Attribute_List",
        RESET => "Reset",
        START => "Start",
        STOP => "Stop",
        CREATE => "Create",
        DELETE => "Delete",
        MULTIPLE_SERVICE_PACKET => "Multiple_Service_Packet",
        APPLY_ATTRIBUTES => "Apply_Attributes",
        GET_ATTRIBUTE_SINGLE => "Get_Attribute_Single",
        SET_ATTRIBUTE_SINGLE => "Set_Attribute_Single",
        FIND_NEXT_OBJECT_INSTANCE => "Find_Next_Object_Instance",
        RESTORE => "Restore",
        SAVE => "Save",
        NO_OPERATION => "No_Operation",
        GET_MEMBER => "Get_Member",
        SET_MEMBER => "Set_Member",
        INSERT_MEMBER => "Insert_Member",
        REMOVE_MEMBER => "Remove_Member",
        GROUP_SYNC => "Group_Sync",
        _ => return None,
    };
    Some(name)
}
