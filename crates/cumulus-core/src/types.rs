use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Remote or local node identifier assigned by the sync backend.
pub type NodeId = String;

/// Seconds since the Unix epoch, as exchanged with the backend.
pub type SyncTime = i64;

/// Which placeholder mechanism a sync folder runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtualFileMode {
    #[default]
    Off,
    #[serde(rename = "wincfapi")]
    Win,
    Mac,
    Suffix,
}

impl VirtualFileMode {
    /// Stable string used in config files; must not change between releases.
    pub fn as_config_str(self) -> &'static str {
        match self {
            VirtualFileMode::Off => "off",
            VirtualFileMode::Suffix => "suffix",
            VirtualFileMode::Win => "wincfapi",
            VirtualFileMode::Mac => "mac",
        }
    }
}

impl fmt::Display for VirtualFileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_str())
    }
}

impl FromStr for VirtualFileMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(VirtualFileMode::Off),
            "suffix" => Ok(VirtualFileMode::Suffix),
            "wincfapi" => Ok(VirtualFileMode::Win),
            "mac" => Ok(VirtualFileMode::Mac),
            _ => Err(()),
        }
    }
}

/// User or system intent about where an item's content should live.
///
/// `Inherited` may only be *set* (meaning "follow the parent folder");
/// a pin-state getter resolves inheritance and never returns it.
/// `Unknown` is the getter's answer when resolution fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinState {
    Inherited,
    AlwaysLocal,
    OnlineOnly,
    #[default]
    Unspecified,
    Unknown,
}

/// Placeholder state of one filesystem entry, recomputed on demand from
/// the provider's metadata and never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsStatus {
    pub is_placeholder: bool,
    pub is_hydrated: bool,
    pub is_syncing: bool,
    /// Hydration progress, 0..=100.
    pub progress: i16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    #[default]
    Unknown,
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDirection {
    #[default]
    Unknown,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncFileStatus {
    #[default]
    Unknown,
    Error,
    Success,
    Conflict,
    Inconsistency,
    Ignored,
    Syncing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncFileInstruction {
    #[default]
    None,
    Update,
    UpdateMetadata,
    Remove,
    Move,
    Get,
    Put,
    Ignore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictType {
    #[default]
    None,
    CreateCreate,
    EditEdit,
    MoveCreate,
    EditDelete,
    MoveDelete,
    MoveMoveSource,
    MoveMoveDest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InconsistencyType {
    #[default]
    None,
    Case,
    ForbiddenChar,
    ReservedName,
    NameLength,
    PathLength,
    NotYetSupportedChar,
    DuplicateNames,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelType {
    #[default]
    None,
    Create,
    Edit,
    Move,
    Delete,
    AlreadyExistRemote,
    AlreadyExistLocal,
    TmpBlacklisted,
    ExcludedByTemplate,
    Hardlink,
}
