//! Version and build information embedded by build.rs

use std::fmt;

/// Build information embedded at compile time
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub git_hash: &'static str,
    git_dirty: &'static str,
    pub build_timestamp: &'static str,
    pub target: &'static str,
    pub profile: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    /// Whether the working tree had uncommitted changes at build time
    pub fn git_dirty(&self) -> bool {
        self.git_dirty == "true"
    }

    /// Version plus git hash, e.g. "0.1.0-abc12345"
    pub fn full_version(&self) -> String {
        if self.git_dirty() {
            format!("{}-{}-dirty", self.version, self.git_hash)
        } else {
            format!("{}-{}", self.version, self.git_hash)
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "Build Information:")?;
        writeln!(f, "  Version:    {}", self.version)?;
        writeln!(f, "  Git Hash:   {}", self.git_hash)?;
        writeln!(f, "  Built:      {}", self.build_timestamp)?;
        writeln!(f, "  Profile:    {}", self.profile)?;
        writeln!(f, "  Target:     {}", self.target)?;
        writeln!(f, "  Compiler:   {}", self.rustc_version)?;
        Ok(())
    }
}

/// Get the current build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        git_hash: env!("OVERLAY_GIT_HASH"),
        git_dirty: env!("OVERLAY_GIT_DIRTY"),
        build_timestamp: env!("OVERLAY_BUILD_TIMESTAMP"),
        target: env!("OVERLAY_TARGET"),
        profile: env!("OVERLAY_PROFILE"),
        rustc_version: env!("OVERLAY_RUSTC_VERSION"),
    }
}

/// Print version information to stdout
pub fn print_version() {
    print!("{}", build_info());
}
