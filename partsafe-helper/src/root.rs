//! Root access detection

use crate::shell::PrivilegedShell;
use partsafe_common::{RootStatus, RootType};

const KERNELSU_MARKER: &str = "/data/adb/ksu";
const MAGISK_MARKER: &str = "/data/adb/magisk/magisk";

/// Check whether elevated access works and classify where it comes from
///
/// Safe to call repeatedly; nothing is written or cached.
pub fn check_access(shell: &dyn PrivilegedShell) -> RootStatus {
    let id = shell.execute("id");
    if !id.success || !id.lines.iter().any(|l| l.contains("uid=0")) {
        log::info!("Root access not available");
        return RootStatus::denied();
    }

    let root_type = detect_root_type(shell);
    log::info!("Root access available ({})", root_type.describe());
    RootStatus::granted(root_type)
}

/// Probe marker paths in priority order; first match wins, `Other` otherwise
fn detect_root_type(shell: &dyn PrivilegedShell) -> RootType {
    if marker_found(shell, &format!("[ -d {KERNELSU_MARKER} ]")) {
        return RootType::KernelIntegrated;
    }

    if marker_found(shell, &format!("[ -f {MAGISK_MARKER} ]")) {
        return RootType::RootManager;
    }

    RootType::Other
}

fn marker_found(shell: &dyn PrivilegedShell, test: &str) -> bool {
    let out = shell.execute(&format!("{test} && echo found || echo missing"));
    out.success && out.first_line() == Some("found")
}
