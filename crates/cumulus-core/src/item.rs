//! Per-change description produced by the sync engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{
    CancelType, ConflictType, InconsistencyType, NodeType, SyncDirection, SyncFileInstruction,
    SyncFileStatus, SyncTime,
};
use crate::NodeId;

/// One filesystem entry undergoing a sync operation.
///
/// Created by the sync engine per detected change and consumed read-only
/// by the VFS layer (`create_placeholder` / `convert_to_placeholder`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncFileItem {
    pub node_type: NodeType,
    /// Sync-folder-relative path.
    pub path: PathBuf,
    /// Destination path for moves.
    pub new_path: Option<PathBuf>,
    pub local_node_id: Option<NodeId>,
    pub remote_node_id: Option<NodeId>,
    pub direction: SyncDirection,
    pub instruction: SyncFileInstruction,
    pub status: SyncFileStatus,
    pub conflict: ConflictType,
    pub inconsistency: InconsistencyType,
    pub cancel_type: CancelType,
    pub size: i64,
    pub modification_time: SyncTime,
    pub creation_time: SyncTime,
    pub dehydrated: bool,
    pub confirmed: bool,
}

impl SyncFileItem {
    pub fn new(
        node_type: NodeType,
        path: PathBuf,
        local_node_id: Option<NodeId>,
        remote_node_id: Option<NodeId>,
        direction: SyncDirection,
        instruction: SyncFileInstruction,
        size: i64,
    ) -> Self {
        Self {
            node_type,
            path,
            local_node_id,
            remote_node_id,
            direction,
            instruction,
            size,
            ..Default::default()
        }
    }

    pub fn is_directory(&self) -> bool {
        self.node_type == NodeType::Directory
    }
}
