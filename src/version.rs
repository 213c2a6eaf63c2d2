//! What this binary is
//!
//! Facts captured by `build.rs` at compile time, and the wire protocol
//! revision. Operators compare this output across nodes when a federation
//! refuses to form.

use std::fmt;

use crate::protocol::PROTOCOL_VERSION;

/// Compile-time identity of the running node
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Short commit hash, or "unknown" outside a checkout
    pub git_hash: &'static str,
    pub git_branch: &'static str,
    /// "true", "false" or "unknown", as written by the build script
    git_dirty_flag: &'static str,
    pub build_timestamp: &'static str,
    pub target: &'static str,
    pub host: &'static str,
    pub profile: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("FEDROUND_GIT_HASH"),
            git_branch: env!("FEDROUND_GIT_BRANCH"),
            git_dirty_flag: env!("FEDROUND_GIT_DIRTY"),
            build_timestamp: env!("FEDROUND_BUILD_TIMESTAMP"),
            target: env!("FEDROUND_TARGET"),
            host: env!("FEDROUND_HOST"),
            profile: env!("FEDROUND_PROFILE"),
            rustc_version: env!("FEDROUND_RUSTC_VERSION"),
        }
    }

    /// Built from a checkout with uncommitted changes
    pub fn git_dirty(&self) -> bool {
        self.git_dirty_flag == "true"
    }

    /// `<version>-<hash>`, with `-dirty` appended for modified checkouts
    pub fn full_version(&self) -> String {
        let suffix = if self.git_dirty() { "-dirty" } else { "" };
        format!("{}-{}{}", self.version, self.git_hash, suffix)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dirty = if self.git_dirty() { " (dirty)" } else { "" };

        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "Node:")?;
        writeln!(f, "  Version:    {}", self.version)?;
        writeln!(f, "  Protocol:   {}", PROTOCOL_VERSION)?;
        writeln!(f)?;
        writeln!(f, "Source:")?;
        writeln!(f, "  Git Hash:   {}{}", self.git_hash, dirty)?;
        writeln!(f, "  Git Branch: {}", self.git_branch)?;
        writeln!(f)?;
        writeln!(f, "Build:")?;
        writeln!(f, "  Built:      {}", self.build_timestamp)?;
        writeln!(f, "  Profile:    {}", self.profile)?;
        writeln!(f, "  Target:     {}", self.target)?;
        writeln!(f, "  Host:       {}", self.host)?;
        writeln!(f, "  Compiler:   {}", self.rustc_version)
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::current()
}

/// `fedround-node version`
pub fn print_version() {
    print!("{}", build_info());
}
