//! Profile data model

use dop_errors::ProfileError;
use dop_hash::{Checksum, Digester};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Host CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86,
    X86_64,
}

impl Arch {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
        }
    }
}

impl FromStr for Arch {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86" => Ok(Self::X86),
            "x86_64" => Ok(Self::X86_64),
            _ => Err(ProfileError::UnknownArch {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Os {
    Linux,
    Windows,
}

impl Os {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }

    #[must_use]
    pub fn is_posix(self) -> bool {
        matches!(self, Self::Linux)
    }
}

impl FromStr for Os {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            _ => Err(ProfileError::UnknownOs {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architecture and OS of the machine the build runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub arch: Arch,
    pub os: Os,
}

impl HostInfo {
    /// The host this binary was compiled for
    #[must_use]
    pub fn current() -> Self {
        let arch = if cfg!(target_arch = "x86") {
            Arch::X86
        } else {
            Arch::X86_64
        };
        let os = if cfg!(windows) { Os::Windows } else { Os::Linux };
        Self { arch, os }
    }
}

/// Requested optimization profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildType {
    Debug,
    Release,
}

impl BuildType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }
}

impl FromStr for BuildType {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            _ => Err(ProfileError::UnknownBuildType {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered tool of the toolchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    /// Stable identifier, e.g. `cc`, `c++`, `dc`
    pub id: String,
    /// Display name, e.g. `gcc`
    pub name: String,
    pub version: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msvc_ver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msvc_disp: Option<String>,
}

impl Tool {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            path: path.into(),
            msvc_ver: None,
            msvc_disp: None,
        }
    }

    /// The environment variable a tool id maps to when injected into a
    /// recipe subprocess
    #[must_use]
    pub fn env_var(&self) -> String {
        match self.id.as_str() {
            "cc" => "CC".to_string(),
            "c++" => "CXX".to_string(),
            "dc" => "DC".to_string(),
            other => other.to_uppercase().replace(['-', '+'], "_"),
        }
    }

    fn feed_digest(&self, digester: &mut Digester) {
        digester.feed_field(&self.id);
        digester.feed_field(&self.name);
        digester.feed_field(&self.version);
        digester.feed_field(&self.path);
        if let Some(ver) = &self.msvc_ver {
            digester.feed_field(ver);
        }
        if let Some(disp) = &self.msvc_disp {
            digester.feed_field(disp);
        }
    }
}

/// A toolchain description for one host and build type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub basename: String,
    pub host: HostInfo,
    pub build_type: BuildType,
    tools: Vec<Tool>,
}

impl Profile {
    /// Create a profile; tools are kept sorted by id
    #[must_use]
    pub fn new(
        basename: impl Into<String>,
        host: HostInfo,
        build_type: BuildType,
        mut tools: Vec<Tool>,
    ) -> Self {
        tools.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            basename: basename.into(),
            host,
            build_type,
            tools,
        }
    }

    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    #[must_use]
    pub fn tool(&self, id: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn has_tool(&self, id: &str) -> bool {
        self.tool(id).is_some()
    }

    /// Display name, e.g. `default-release`
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}-{}", self.basename, self.build_type)
    }

    /// A new profile carrying only the named tools, order preserved
    ///
    /// Recipes declare the tools they use; hashing the subset keeps a
    /// package's build id independent of unrelated toolchain entries.
    #[must_use]
    pub fn subset(&self, ids: &[String]) -> Self {
        let tools = self
            .tools
            .iter()
            .filter(|t| ids.iter().any(|id| *id == t.id))
            .cloned()
            .collect();
        Self {
            basename: self.basename.clone(),
            host: self.host,
            build_type: self.build_type,
            tools,
        }
    }

    /// Environment variables to inject into recipe subprocesses
    #[must_use]
    pub fn env_vars(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|t| (t.env_var(), t.path.clone()))
            .collect()
    }

    /// Feed the profile's identity bytes into a digest
    pub fn feed_digest(&self, digester: &mut Digester) {
        digester.feed_field(self.host.arch.as_str());
        digester.feed_field(self.host.os.as_str());
        digester.feed_field(self.build_type.as_str());
        for tool in &self.tools {
            tool.feed_digest(digester);
        }
    }

    /// Lowercase hex SHA-1 of the profile's identity bytes
    #[must_use]
    pub fn digest_hash(&self) -> String {
        let mut digester = Digester::new();
        self.feed_digest(&mut digester);
        digester.finish().to_hex()
    }

    #[must_use]
    pub fn digest_checksum(&self) -> Checksum {
        let mut digester = Digester::new();
        self.feed_digest(&mut digester);
        digester.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_profile() -> Profile {
        Profile::new(
            "default",
            HostInfo {
                arch: Arch::X86_64,
                os: Os::Linux,
            },
            BuildType::Release,
            vec![
                Tool::new("dc", "dmd", "2.105.0", "/usr/bin/dmd"),
                Tool::new("cc", "gcc", "13.1.0", "/usr/bin/gcc"),
            ],
        )
    }

    #[test]
    fn tools_are_sorted_by_id() {
        let profile = sample_profile();
        let ids: Vec<_> = profile.tools().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["cc", "dc"]);
    }

    #[test]
    fn digest_is_stable() {
        let a = sample_profile();
        let b = sample_profile();
        assert_eq!(a.digest_hash(), b.digest_hash());
    }

    #[test]
    fn digest_ignores_tool_declaration_order() {
        let host = HostInfo {
            arch: Arch::X86_64,
            os: Os::Linux,
        };
        let t1 = Tool::new("cc", "gcc", "13.1.0", "/usr/bin/gcc");
        let t2 = Tool::new("dc", "dmd", "2.105.0", "/usr/bin/dmd");
        let a = Profile::new("p", host, BuildType::Debug, vec![t1.clone(), t2.clone()]);
        let b = Profile::new("p", host, BuildType::Debug, vec![t2, t1]);
        assert_eq!(a.digest_hash(), b.digest_hash());
    }

    #[test]
    fn subset_keeps_order_and_changes_digest() {
        let profile = sample_profile();
        let sub = profile.subset(&["dc".to_string()]);
        assert_eq!(sub.tools().len(), 1);
        assert_eq!(sub.tools()[0].id, "dc");
        assert_ne!(sub.digest_hash(), profile.digest_hash());
    }

    #[test]
    fn env_var_mapping() {
        assert_eq!(Tool::new("cc", "", "", "").env_var(), "CC");
        assert_eq!(Tool::new("c++", "", "", "").env_var(), "CXX");
        assert_eq!(Tool::new("dc", "", "", "").env_var(), "DC");
    }
}
