//! Stable integer opcodes for the wire protocol. Values are an
//! implementation choice; once fixed they must never move.

pub const CREATE: i32 = 1;
pub const RIDER_STATUS: i32 = 2;
pub const RIDER_CONFIRM: i32 = 3;
pub const RIDER_CANCEL: i32 = 4;
pub const DRIVER_QUEUE: i32 = 5;
pub const DRIVER_DECISION: i32 = 6;
