//! Host kind selection
//!
//! A [`HostKind`] is chosen once when the system is built and handed to every
//! component; nothing inspects the environment afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The runtime flavor the compiler system is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKind {
    /// Multi-process native host with a real filesystem
    #[default]
    Native,
    /// Sandboxed isolate with a real filesystem and async network
    Isolate,
    /// Background thread without a filesystem that can block on imports
    BackgroundThread,
    /// Fetch-capable host without a filesystem
    FetchOnly,
}

impl HostKind {
    /// All host kinds.
    pub const ALL: [HostKind; 4] = [
        HostKind::Native,
        HostKind::Isolate,
        HostKind::BackgroundThread,
        HostKind::FetchOnly,
    ];

    /// Stable name used in configuration and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            HostKind::Native => "native",
            HostKind::Isolate => "isolate",
            HostKind::BackgroundThread => "background-thread",
            HostKind::FetchOnly => "fetch-only",
        }
    }

    /// Whether the host exposes a real filesystem.
    pub fn has_filesystem(self) -> bool {
        matches!(self, HostKind::Native | HostKind::Isolate)
    }

    /// Whether blocking network imports are allowed.
    pub fn supports_sync_import(self) -> bool {
        self == HostKind::BackgroundThread
    }

    /// Whether asynchronous network loads are allowed.
    pub fn supports_fetch(self) -> bool {
        matches!(self, HostKind::Isolate | HostKind::FetchOnly)
    }

    /// Whether workers may be separate OS processes.
    pub fn supports_process_workers(self) -> bool {
        self == HostKind::Native
    }

    /// Runtime name reported in [`SystemDetails`](crate::SystemDetails).
    pub fn runtime(self) -> &'static str {
        match self {
            HostKind::Native => "kiln-native",
            HostKind::Isolate => "kiln-isolate",
            HostKind::BackgroundThread => "kiln-thread",
            HostKind::FetchOnly => "kiln-fetch",
        }
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HostKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown host kind: {s}"))
    }
}
