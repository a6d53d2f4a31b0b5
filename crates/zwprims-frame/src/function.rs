//! Well-known serial API function ids.
//!
//! Only the functions this stack drives or routes are named here; any other
//! id still travels through the link untouched.

/// Controller capabilities and node bitmap.
pub const GET_INIT_DATA: u8 = 0x02;

/// Inbound application command from a node (unsolicited event).
pub const APPLICATION_COMMAND_HANDLER: u8 = 0x04;

/// Controller capabilities.
pub const GET_CONTROLLER_CAPABILITIES: u8 = 0x05;

/// Serial API capabilities (supported function bitmap).
pub const SERIAL_API_GET_CAPABILITIES: u8 = 0x07;

/// Soft-reset the controller chip.
pub const SERIAL_API_SOFT_RESET: u8 = 0x08;

/// Transmit an application command to a node.
pub const SEND_DATA: u8 = 0x13;

/// Library type and firmware version string.
pub const GET_VERSION: u8 = 0x15;

/// Home id and own node id.
pub const MEMORY_GET_ID: u8 = 0x20;

/// Node information frames and other network updates.
pub const APPLICATION_UPDATE: u8 = 0x49;

/// Start/stop inclusion.
pub const ADD_NODE_TO_NETWORK: u8 = 0x4A;

/// Start/stop exclusion.
pub const REMOVE_NODE_FROM_NETWORK: u8 = 0x4B;

/// Ask a node for its node information frame.
pub const REQUEST_NODE_INFO: u8 = 0x60;

/// Returns a human-readable name for a function id.
pub fn function_name(id: u8) -> &'static str {
    match id {
        GET_INIT_DATA => "GET_INIT_DATA",
        APPLICATION_COMMAND_HANDLER => "APPLICATION_COMMAND_HANDLER",
        GET_CONTROLLER_CAPABILITIES => "GET_CONTROLLER_CAPABILITIES",
        SERIAL_API_GET_CAPABILITIES => "SERIAL_API_GET_CAPABILITIES",
        SERIAL_API_SOFT_RESET => "SERIAL_API_SOFT_RESET",
        SEND_DATA => "SEND_DATA",
        GET_VERSION => "GET_VERSION",
        MEMORY_GET_ID => "MEMORY_GET_ID",
        APPLICATION_UPDATE => "APPLICATION_UPDATE",
        ADD_NODE_TO_NETWORK => "ADD_NODE_TO_NETWORK",
        REMOVE_NODE_FROM_NETWORK => "REMOVE_NODE_FROM_NETWORK",
        REQUEST_NODE_INFO => "REQUEST_NODE_INFO",
        _ => "UNKNOWN",
    }
}

/// Returns true if frames for this function arrive unsolicited from the
/// controller rather than as answers to a host request.
pub fn is_unsolicited(id: u8) -> bool {
    matches!(id, APPLICATION_COMMAND_HANDLER | APPLICATION_UPDATE)
}
