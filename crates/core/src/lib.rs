use time::format_description::well_known::Rfc3339;

pub mod config;
pub mod environment;
pub mod hardware;
pub mod os;

pub use config::PatcherConfig;
pub use environment::{EnvironmentSnapshot, KdkArtifact, KdkChecksum};
pub use hardware::{
    Architecture, CpuDescriptor, CpuGeneration, DeviceDescriptor, DeviceKind, DeviceSource,
    HardwareProfile, HostFlags, MachineIdentity, RawPciDevice,
};
pub use os::{kernel, KernelVersion, OsInfo, OsVersionRange};

pub const PROFILE_SCHEMA_VERSION: &str = "1.0.0";

pub fn now_utc_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
