//! Device-derived owner fingerprint.

use crate::application::ports::DeviceIdentity;
use sha2::{Digest, Sha256};
use std::env;
use std::fs;

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Fingerprint derived from the machine id, host name and user name.
///
/// The inputs are read once at construction; the fingerprint is the hex
/// SHA-256 of `machine_id \n host \n user`.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    fingerprint: String,
}

impl HostIdentity {
    pub fn detect() -> Self {
        let machine_id = MACHINE_ID_PATHS
            .iter()
            .find_map(|path| fs::read_to_string(path).ok())
            .map(|id| id.trim().to_string())
            .unwrap_or_default();
        let host = env::var("HOSTNAME")
            .ok()
            .or_else(|| fs::read_to_string("/etc/hostname").ok())
            .map(|h| h.trim().to_string())
            .unwrap_or_default();
        let user = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .unwrap_or_default();
        Self::from_parts(&machine_id, &host, &user)
    }

    pub fn from_parts(machine_id: &str, host: &str, user: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(machine_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(host.as_bytes());
        hasher.update(b"\n");
        hasher.update(user.as_bytes());

        let fingerprint = hasher.finalize().iter().fold(String::new(), |mut out, b| {
            let _ = std::fmt::write(&mut out, format_args!("{:02x}", b));
            out
        });
        Self { fingerprint }
    }
}

impl DeviceIdentity for HostIdentity {
    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }
}
