use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Darwin kernel majors for the releases the patcher knows about.
pub mod kernel {
    pub const SIERRA: u32 = 16;
    pub const HIGH_SIERRA: u32 = 17;
    pub const MOJAVE: u32 = 18;
    pub const CATALINA: u32 = 19;
    pub const BIG_SUR: u32 = 20;
    pub const MONTEREY: u32 = 21;
    pub const VENTURA: u32 = 22;
    pub const SONOMA: u32 = 23;
    pub const SEQUOIA: u32 = 24;
    pub const MAX: u32 = 99;
}

/// A Darwin (major, minor) pair. Ordering is major first, then minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
}

impl KernelVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses a Darwin release string such as `22.4.0`.
    pub fn parse_release(value: &str) -> Result<Self> {
        let mut parts = value.trim().split('.');
        let major = parts
            .next()
            .and_then(|part| part.parse::<u32>().ok())
            .ok_or_else(|| anyhow!("invalid kernel release {}", value))?;
        let minor = parts
            .next()
            .map(|part| part.parse::<u32>())
            .transpose()
            .map_err(|_| anyhow!("invalid kernel release {}", value))?
            .unwrap_or(0);
        Ok(Self { major, minor })
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Closed interval of kernel versions, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsVersionRange {
    min: KernelVersion,
    max: KernelVersion,
}

impl OsVersionRange {
    pub fn new(min: KernelVersion, max: KernelVersion) -> Result<Self> {
        if min > max {
            return Err(anyhow!("invalid version range {} > {}", min, max));
        }
        Ok(Self { min, max })
    }

    /// Const constructor for static tables; callers guarantee `min <= max`.
    pub const fn between(min_major: u32, min_minor: u32, max_major: u32, max_minor: u32) -> Self {
        Self {
            min: KernelVersion::new(min_major, min_minor),
            max: KernelVersion::new(max_major, max_minor),
        }
    }

    /// Every minor of every major in `from..=to`.
    pub const fn majors(from: u32, to: u32) -> Self {
        Self::between(from, 0, to, 99)
    }

    pub const fn since(major: u32) -> Self {
        Self::majors(major, kernel::MAX)
    }

    pub fn min(&self) -> KernelVersion {
        self.min
    }

    pub fn max(&self) -> KernelVersion {
        self.max
    }

    pub fn contains(&self, version: KernelVersion) -> bool {
        self.min <= version && version <= self.max
    }
}

/// The running OS as the patcher sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub kernel: KernelVersion,
    pub build: String,
    pub product_version: String,
}

impl OsInfo {
    pub fn new(kernel: KernelVersion, build: impl Into<String>, product_version: impl Into<String>) -> Self {
        Self {
            kernel,
            build: build.into(),
            product_version: product_version.into(),
        }
    }

    pub fn from_release(release: &str, build: &str, product_version: &str) -> Result<Self> {
        Ok(Self::new(KernelVersion::parse_release(release)?, build, product_version))
    }

    pub fn major(&self) -> u32 {
        self.kernel.major
    }

    pub fn minor(&self) -> u32 {
        self.kernel.minor
    }

    /// `"22.4 (22E261)"`, the form stored in the installed-patch manifest.
    pub fn manifest_label(&self) -> String {
        format!("{} ({})", self.kernel, self.build)
    }

    pub fn marketing_name(&self) -> &'static str {
        marketing_name(self.kernel.major)
    }
}

pub fn marketing_name(major: u32) -> &'static str {
    match major {
        kernel::SIERRA => "Sierra",
        kernel::HIGH_SIERRA => "High Sierra",
        kernel::MOJAVE => "Mojave",
        kernel::CATALINA => "Catalina",
        kernel::BIG_SUR => "Big Sur",
        kernel::MONTEREY => "Monterey",
        kernel::VENTURA => "Ventura",
        kernel::SONOMA => "Sonoma",
        kernel::SEQUOIA => "Sequoia",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_inclusive_on_both_ends() {
        let range = OsVersionRange::new(KernelVersion::new(12, 1), KernelVersion::new(99, 99)).unwrap();
        assert!(range.contains(KernelVersion::new(12, 1)));
        assert!(range.contains(KernelVersion::new(99, 99)));
        assert!(!range.contains(KernelVersion::new(12, 0)));
        assert!(!range.contains(KernelVersion::new(11, 99)));
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(OsVersionRange::new(KernelVersion::new(22, 0), KernelVersion::new(21, 99)).is_err());
    }

    #[test]
    fn parses_darwin_release() {
        assert_eq!(KernelVersion::parse_release("22.4.0").unwrap(), KernelVersion::new(22, 4));
        assert_eq!(KernelVersion::parse_release("23").unwrap(), KernelVersion::new(23, 0));
        assert!(KernelVersion::parse_release("ventura").is_err());
    }

    #[test]
    fn manifest_label_uses_kernel_and_build() {
        let os = OsInfo::from_release("21.6.0", "21G115", "12.5").unwrap();
        assert_eq!(os.manifest_label(), "21.6 (21G115)");
        assert_eq!(os.marketing_name(), "Monterey");
    }
}
