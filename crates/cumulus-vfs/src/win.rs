//! Windows Cloud Files placeholder provider.
//!
//! Backed by the Cloud Filter API (Windows 10 1709+):
//! - CfRegisterSyncRoot() / CfConnectSyncRoot() — start sequence
//! - CfCreatePlaceholders() — materialize dehydrated entries
//! - CfHydratePlaceholder() / CfDehydratePlaceholder() — content transfer
//! - CfSetPinState() / CfGetPlaceholderStateFromFileInfo() — pin and status
//! - CfUnregisterSyncRoot() — full removal when the folder is dropped
//!
//! The sync root appears in Explorer's navigation pane and hydration
//! runs through FETCH_DATA callbacks delivered by the filter driver.

#![cfg(target_os = "windows")]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use cumulus_core::types::SyncTime;
use cumulus_core::{
    ExitCause, ExitInfo, ExitResult, NodeId, PinState, SyncFileItem, VfsStatus, VirtualFileMode,
};

use crate::registry::{OsProbe, Platform};
use crate::{check_if_path_is_valid, FetchProgress, StartReport, Vfs, VfsSetupParams};

pub fn create_provider(params: VfsSetupParams) -> Result<Arc<dyn Vfs>> {
    Ok(Arc::new(WinVfs::new(params)))
}

pub fn os_probe() -> OsProbe {
    // TODO: read the real version from RtlGetVersion and the product
    // type from GetProductInfo (server SKUs report differently).
    OsProbe {
        platform: Platform::Windows,
        major: 10,
        minor: 0,
        build: 0,
    }
}

pub struct WinVfs {
    params: VfsSetupParams,
}

impl WinVfs {
    pub fn new(params: VfsSetupParams) -> Self {
        Self { params }
    }

    fn full_path(&self, relative: &Path) -> std::path::PathBuf {
        self.params.local_path.join(relative)
    }
}

impl Vfs for WinVfs {
    fn mode(&self) -> VirtualFileMode {
        VirtualFileMode::Win
    }

    fn params(&self) -> &VfsSetupParams {
        &self.params
    }

    fn start_impl(&self, report: &mut StartReport) -> ExitResult<()> {
        info!(
            root = %self.params.local_path.display(),
            clsid = %self.params.namespace_clsid,
            "registering Cloud Files sync root"
        );
        // TODO: CfRegisterSyncRoot with the namespace CLSID, then
        // CfConnectSyncRoot and the FETCH_DATA/CANCEL_FETCH_DATA
        // callback table.
        warn!("Cloud Files sync root registration not yet implemented");
        report.installation_done = false;
        report.activation_done = false;
        report.connection_done = false;
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn stop_impl(&self, unregister: bool) {
        info!(unregister, "disconnecting Cloud Files sync root");
        // TODO: CfDisconnectSyncRoot, plus CfUnregisterSyncRoot when
        // unregister is set.
    }

    fn update_metadata(
        &self,
        path: &Path,
        _creation_time: SyncTime,
        _modification_time: SyncTime,
        _size: i64,
        _file_id: &NodeId,
    ) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: CfUpdatePlaceholder with the new FILE_BASIC_INFO.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn create_placeholder(&self, relative_path: &Path, item: &SyncFileItem) -> ExitResult<()> {
        if relative_path.as_os_str().is_empty() || item.remote_node_id.is_none() {
            return Err(ExitInfo::system(ExitCause::InvalidArgument));
        }
        check_if_path_is_valid(&self.full_path(relative_path), false)?;
        // TODO: CfCreatePlaceholders on the parent directory.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn dehydrate_placeholder(&self, path: &Path) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: CfDehydratePlaceholder; FileLocked when the handle is
        // open elsewhere, NotPlaceHolder from the placeholder-state
        // probe.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn convert_to_placeholder(&self, path: &Path, _item: &SyncFileItem) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: CfConvertToPlaceholder; already-a-placeholder must
        // return Ok.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn update_fetch_status(
        &self,
        _tmp_path: &Path,
        path: &Path,
        _received: i64,
    ) -> ExitResult<FetchProgress> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: CfReportProviderProgress on the active transfer key and
        // CfExecute(TRANSFER_DATA) from the staging file.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn force_status(&self, path: &Path, _status: &VfsStatus) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: CfSetInSyncState plus the shell change notification.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn is_dehydrated_placeholder(&self, path: &Path) -> ExitResult<bool> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: CfGetPlaceholderStateFromFileInfo, check PARTIAL bits.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn set_pin_state(&self, path: &Path, _state: PinState) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: CfSetPinState with CF_SET_PIN_FLAG_RECURSE for folders.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn pin_state(&self, _path: &Path) -> PinState {
        // TODO: CfGetPlaceholderInfo and map CF_PIN_STATE, resolving
        // INHERIT against ancestors.
        PinState::Unknown
    }

    fn status(&self, path: &Path) -> ExitResult<VfsStatus> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: derive from placeholder state + in-sync state + any
        // in-flight hydration for the path.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn set_thumbnail(&self, path: &Path, _picture: &[u8]) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: IThumbnailCache custom provider hookup.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn set_app_exclude_list(&self, _app_list: &str) -> ExitResult<()> {
        // TODO: pass the list to the filter so accesses from these
        // process images never trigger FETCH_DATA.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn fetching_app_list(&self) -> ExitResult<HashMap<String, String>> {
        // TODO: snapshot the processes currently blocked in FETCH_DATA.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn exclude(&self, path: &Path) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: CfConvertToPlaceholder reversal + FILE_ATTRIBUTE
        // cleanup so the entry stops being tracked.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn is_excluded(&self, _path: &Path) -> bool {
        false
    }

    fn clear_file_attributes(&self, path: &Path) {
        // TODO: strip FILE_ATTRIBUTE_PINNED/UNPINNED/OFFLINE.
        let _ = path;
    }

    fn hydrate(&self, path: &Path) -> ExitResult<()> {
        check_if_path_is_valid(&self.full_path(path), true)?;
        // TODO: CfHydratePlaceholder, blocking until the transfer
        // completes or is canceled.
        Err(ExitInfo::system(ExitCause::UnableToCreateVfs))
    }

    fn dehydrate(&self, path: &Path) -> ExitResult<()> {
        self.dehydrate_placeholder(path)
    }

    fn cancel_hydrate(&self, path: &Path) {
        // TODO: CfExecute(CANCEL) on the transfer key for this path.
        let _ = path;
    }
}
