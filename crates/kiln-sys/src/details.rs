//! Platform metadata
//!
//! Memory and release figures are best-effort: anything the platform cannot
//! report comes back as zero or `"unknown"`.

use serde::Serialize;

use crate::host::HostKind;

/// Platform metadata exposed through [`CompilerSystem::details`](crate::CompilerSystem::details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDetails {
    /// Operating system name (`linux`, `macos`, `windows`, ...)
    pub platform: String,
    /// Kernel release, or `unknown`
    pub release: String,
    /// Logical CPU count
    pub cpus: usize,
    /// Total memory in bytes, 0 when unknown
    #[serde(rename = "totalmem")]
    pub total_mem: u64,
    /// Free memory in bytes, 0 when unknown
    #[serde(rename = "freemem")]
    pub free_mem: u64,
    /// Runtime name for the host kind
    pub runtime: String,
    /// Runtime version
    pub runtime_version: String,
}

impl SystemDetails {
    /// Collect details for the current machine.
    pub fn collect(host: HostKind) -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            release: kernel_release(),
            cpus: num_cpus::get(),
            total_mem: total_memory(),
            free_mem: free_memory(),
            runtime: host.runtime().to_string(),
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn kernel_release() -> String {
    #[cfg(unix)]
    {
        use std::ffi::CStr;
        // SAFETY: uname is safe with a properly zeroed struct
        let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
        if unsafe { libc::uname(&mut uts) } != 0 {
            return "unknown".to_string();
        }
        // SAFETY: uname null-terminates all fields
        unsafe { CStr::from_ptr(uts.release.as_ptr()) }
            .to_str()
            .unwrap_or("unknown")
            .to_string()
    }
    #[cfg(not(unix))]
    {
        "unknown".to_string()
    }
}

#[cfg(target_os = "linux")]
fn sysinfo() -> Option<libc::sysinfo> {
    // SAFETY: sysinfo fills a caller-owned zeroed struct
    let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
    if unsafe { libc::sysinfo(&mut info) } == 0 {
        Some(info)
    } else {
        None
    }
}

fn total_memory() -> u64 {
    #[cfg(target_os = "linux")]
    {
        sysinfo().map_or(0, |info| info.totalram as u64 * u64::from(info.mem_unit))
    }
    #[cfg(target_os = "macos")]
    {
        let mut size: u64 = 0;
        let mut len = std::mem::size_of::<u64>();
        let mut mib = [libc::CTL_HW, libc::HW_MEMSIZE];
        // SAFETY: mib and out-pointers are valid for the call
        let ret = unsafe {
            libc::sysctl(
                mib.as_mut_ptr(),
                2,
                &mut size as *mut u64 as *mut _,
                &mut len,
                std::ptr::null_mut(),
                0,
            )
        };
        if ret == 0 { size } else { 0 }
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        0
    }
}

fn free_memory() -> u64 {
    #[cfg(target_os = "linux")]
    {
        sysinfo().map_or(0, |info| info.freeram as u64 * u64::from(info.mem_unit))
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}
