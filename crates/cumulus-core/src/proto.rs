//! Comm protocol model: message kinds, request and signal numbers,
//! default timeouts. The wire codec itself lives in `cumulus-comm`.

use serde::{Deserialize, Serialize};

pub const COMM_SHORT_TIMEOUT_MS: u64 = 1_000;
pub const COMM_AVERAGE_TIMEOUT_MS: u64 = 10_000;
pub const COMM_LONG_TIMEOUT_MS: u64 = 60_000;

/// Discriminator carried in the `msgType` field of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MsgType {
    Request = 0,
    Reply = 1,
    Signal = 2,
}

impl TryFrom<i32> for MsgType {
    type Error = i32;

    fn try_from(v: i32) -> Result<Self, i32> {
        match v {
            0 => Ok(MsgType::Request),
            1 => Ok(MsgType::Reply),
            2 => Ok(MsgType::Signal),
            other => Err(other),
        }
    }
}

/// Operations a client may invoke on the server.
///
/// Numbers are part of the wire contract between the GUI and the server
/// binary; append only, never renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum RequestNum {
    SyncStart = 1,
    SyncStop,
    SyncStatus,
    SyncIsRunning,
    SyncSetSupportsVirtualFiles,
    SyncSetRootPinState,
    NodePinState,
    NodeSetPinState,
    NodeVfsStatus,
    UtilityBestVfsAvailableMode,
    UtilityCheckCommStatus,
    UtilityQuit,
}

impl TryFrom<i32> for RequestNum {
    type Error = i32;

    fn try_from(v: i32) -> Result<Self, i32> {
        use RequestNum::*;
        Ok(match v {
            1 => SyncStart,
            2 => SyncStop,
            3 => SyncStatus,
            4 => SyncIsRunning,
            5 => SyncSetSupportsVirtualFiles,
            6 => SyncSetRootPinState,
            7 => NodePinState,
            8 => NodeSetPinState,
            9 => NodeVfsStatus,
            10 => UtilityBestVfsAvailableMode,
            11 => UtilityCheckCommStatus,
            12 => UtilityQuit,
            other => return Err(other),
        })
    }
}

/// Out-of-band notifications pushed from the server to every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum SignalNum {
    SyncAdded = 0,
    SyncUpdated,
    SyncRemoved,
    SyncProgressInfo,
    SyncCompletedItem,
    SyncVfsConversionCompleted,
    NodeFolderSizeCompleted,
    UtilityShowNotification,
    UtilityErrorAdded,
    UtilityQuit,
}

impl TryFrom<i32> for SignalNum {
    type Error = i32;

    fn try_from(v: i32) -> Result<Self, i32> {
        use SignalNum::*;
        Ok(match v {
            0 => SyncAdded,
            1 => SyncUpdated,
            2 => SyncRemoved,
            3 => SyncProgressInfo,
            4 => SyncCompletedItem,
            5 => SyncVfsConversionCompleted,
            6 => NodeFolderSizeCompleted,
            7 => UtilityShowNotification,
            8 => UtilityErrorAdded,
            9 => UtilityQuit,
            other => return Err(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_discriminants_are_wire_stable() {
        assert_eq!(MsgType::Request as i32, 0);
        assert_eq!(MsgType::Reply as i32, 1);
        assert_eq!(MsgType::Signal as i32, 2);
        assert_eq!(MsgType::try_from(3), Err(3));
    }

    #[test]
    fn request_num_round_trips() {
        for num in [
            RequestNum::SyncStart,
            RequestNum::NodeSetPinState,
            RequestNum::UtilityQuit,
        ] {
            assert_eq!(RequestNum::try_from(num as i32), Ok(num));
        }
    }
}
