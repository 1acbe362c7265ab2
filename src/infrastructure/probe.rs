//! Filesystem-based device integrity probes.

use crate::application::ports::DeviceProbe;
use std::path::{Path, PathBuf};

const SU_PATHS: &[&str] = &[
    "/system/bin/su",
    "/system/xbin/su",
    "/sbin/su",
    "/system/su",
    "/system/bin/.ext/.su",
    "/data/local/xbin/su",
    "/data/local/bin/su",
    "/su/bin/su",
    "/system/app/Superuser.apk",
    "/data/adb/magisk",
];

const EMULATOR_MARKERS: &[&str] = &[
    "/dev/socket/qemud",
    "/dev/qemu_pipe",
    "/system/lib/libc_malloc_debug_qemu.so",
    "/sys/qemu_trace",
    "/system/bin/qemu-props",
    "/dev/goldfish_pipe",
];

const HOOK_MARKERS: &[(&str, &str)] = &[
    ("xposed", "/system/framework/XposedBridge.jar"),
    ("xposed", "/system/lib/libxposed_art.so"),
    ("lsposed", "/data/adb/lspd"),
    ("frida", "/data/local/tmp/frida-server"),
    ("frida", "/data/local/tmp/re.frida.server"),
    ("substrate", "/system/lib/libsubstrate.so"),
];

/// Probes for root, emulator and hook-framework markers under a filesystem
/// root. Debuggability is taken from the build profile.
#[derive(Debug, Clone)]
pub struct HostProbe {
    root: PathBuf,
}

impl HostProbe {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Resolve every marker path under `root` instead of `/`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn present(&self, marker: &str) -> bool {
        self.resolve(marker).exists()
    }

    fn resolve(&self, marker: &str) -> PathBuf {
        self.root.join(Path::new(marker.trim_start_matches('/')))
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProbe for HostProbe {
    fn is_rooted(&self) -> bool {
        SU_PATHS.iter().any(|path| self.present(path))
    }

    fn is_emulator(&self) -> bool {
        EMULATOR_MARKERS.iter().any(|path| self.present(path))
    }

    fn is_debuggable(&self) -> bool {
        cfg!(debug_assertions)
    }

    fn hook_frameworks(&self) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for (name, path) in HOOK_MARKERS {
            if self.present(path) && !found.iter().any(|f| f == name) {
                found.push((*name).to_string());
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, marker: &str) {
        let path = root.join(marker.trim_start_matches('/'));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_clean_root_has_no_markers() {
        let dir = tempfile::tempdir().unwrap();
        let probe = HostProbe::with_root(dir.path());
        assert!(!probe.is_rooted());
        assert!(!probe.is_emulator());
        assert!(probe.hook_frameworks().is_empty());
    }

    #[test]
    fn test_markers_detected() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "/system/xbin/su");
        touch(dir.path(), "/dev/qemu_pipe");
        touch(dir.path(), "/system/framework/XposedBridge.jar");
        touch(dir.path(), "/system/lib/libxposed_art.so");
        touch(dir.path(), "/data/local/tmp/frida-server");

        let probe = HostProbe::with_root(dir.path());
        assert!(probe.is_rooted());
        assert!(probe.is_emulator());
        assert_eq!(probe.hook_frameworks(), vec!["xposed", "frida"]);
    }

    #[test]
    fn test_debuggable_follows_build_profile() {
        assert_eq!(HostProbe::new().is_debuggable(), cfg!(debug_assertions));
    }
}
