//! Compile-time provider registry and OS capability gating.
//!
//! Providers are linked into the binary and described by a
//! [`ProviderDescriptor`] carrying interface-id, kind, and version
//! metadata. The metadata is validated before the factory runs so a
//! build mix-up (stale component, wrong kind) fails with a diagnosable
//! message instead of undefined behavior at the first placeholder call.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::{info, warn};

use cumulus_core::VirtualFileMode;

use crate::off::VfsOff;
use crate::{Vfs, VfsSetupParams};

/// Interface id every provider factory must declare.
pub const PROVIDER_FACTORY_IID: &str = "org.cumulusdrive.ProviderFactory";

/// Component kind for VFS providers.
pub const PROVIDER_KIND: &str = "vfs";

/// Minimum Windows 10 build with a usable Cloud Files API.
pub const MIN_WINDOWS10_BUILD_FOR_CFAPI: u32 = 16299;

type ProviderFactory = fn(VfsSetupParams) -> Result<Arc<dyn Vfs>>;

/// Static metadata plus constructor for one linked-in provider.
pub struct ProviderDescriptor {
    pub name: &'static str,
    pub iid: &'static str,
    pub kind: &'static str,
    pub version: &'static str,
    pub factory: ProviderFactory,
}

fn registered_providers() -> &'static [(VirtualFileMode, ProviderDescriptor)] {
    &[
        #[cfg(target_os = "windows")]
        (
            VirtualFileMode::Win,
            ProviderDescriptor {
                name: "wincfapi",
                iid: PROVIDER_FACTORY_IID,
                kind: PROVIDER_KIND,
                version: env!("CARGO_PKG_VERSION"),
                factory: crate::win::create_provider,
            },
        ),
        #[cfg(target_os = "macos")]
        (
            VirtualFileMode::Mac,
            ProviderDescriptor {
                name: "mac",
                iid: PROVIDER_FACTORY_IID,
                kind: PROVIDER_KIND,
                version: env!("CARGO_PKG_VERSION"),
                factory: crate::mac::create_provider,
            },
        ),
    ]
}

/// Operating-system facts that decide provider availability, captured
/// as plain data so the decision logic stays testable on any host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsProbe {
    pub platform: Platform,
    pub major: u32,
    pub minor: u32,
    /// Windows build number; unused elsewhere.
    pub build: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    /// Windows Server never gets Cloud Files placeholders.
    WindowsServer,
    MacOs,
    Linux,
}

impl OsProbe {
    /// Probe the host this process runs on.
    pub fn current() -> Self {
        #[cfg(target_os = "windows")]
        {
            crate::win::os_probe()
        }
        #[cfg(target_os = "macos")]
        {
            crate::mac::os_probe()
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            Self {
                platform: Platform::Linux,
                major: 0,
                minor: 0,
                build: 0,
            }
        }
    }

    /// Whether this OS can run the given placeholder mechanism.
    pub fn supports(&self, mode: VirtualFileMode) -> bool {
        match mode {
            VirtualFileMode::Off => true,
            VirtualFileMode::Win => {
                self.platform == Platform::Windows && self.build >= MIN_WINDOWS10_BUILD_FOR_CFAPI
            }
            VirtualFileMode::Mac => {
                self.platform == Platform::MacOs
                    && (self.major > 10 || (self.major == 10 && self.minor >= 15))
            }
            // The suffix fallback is retired; folders configured with it
            // are migrated to Off at load time.
            VirtualFileMode::Suffix => false,
        }
    }
}

pub fn is_provider_available(mode: VirtualFileMode) -> bool {
    OsProbe::current().supports(mode)
}

/// Richest mode the given OS can run: Cloud Files, then the macOS file
/// provider, then nothing.
pub fn best_available_mode(probe: &OsProbe) -> VirtualFileMode {
    for mode in [
        VirtualFileMode::Win,
        VirtualFileMode::Mac,
        VirtualFileMode::Suffix,
    ] {
        if probe.supports(mode) {
            return mode;
        }
    }
    VirtualFileMode::Off
}

fn validate(descriptor: &ProviderDescriptor) -> Result<()> {
    if descriptor.iid != PROVIDER_FACTORY_IID {
        bail!("Plugin has wrong IID: {}", descriptor.iid);
    }
    if descriptor.kind != PROVIDER_KIND {
        bail!("Plugin has wrong type: {}", descriptor.kind);
    }
    if descriptor.version != env!("CARGO_PKG_VERSION") {
        bail!("Plugin has wrong type: {}", descriptor.version);
    }
    Ok(())
}

/// Instantiate the provider for `mode`, or fail with a message suitable
/// for the sync-folder error surface.
///
/// `Off` always succeeds. For other modes the OS must support the
/// mechanism and the descriptor metadata must validate; only then does
/// the factory run, with panics contained to an error.
pub fn create_vfs(mode: VirtualFileMode, params: VfsSetupParams) -> Result<Arc<dyn Vfs>> {
    if mode == VirtualFileMode::Off {
        return Ok(Arc::new(VfsOff::new(params)));
    }

    let probe = OsProbe::current();
    if !probe.supports(mode) {
        bail!("virtual file mode {mode} is not available on this system");
    }

    let Some((_, descriptor)) = registered_providers()
        .iter()
        .find(|(provider_mode, _)| *provider_mode == mode)
    else {
        bail!("no provider built in for mode {mode}");
    };

    validate(descriptor)?;

    info!(provider = descriptor.name, "creating vfs provider");
    match catch_unwind(AssertUnwindSafe(|| (descriptor.factory)(params))) {
        Ok(result) => result,
        Err(_) => {
            warn!(provider = descriptor.name, "provider factory panicked");
            Err(anyhow!("provider {} failed to initialize", descriptor.name))
        }
    }
}
