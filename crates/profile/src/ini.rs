//! INI persistence for profiles
//!
//! ```ini
//! [main]
//! basename = default
//! buildtype = release
//!
//! [host]
//! arch = x86_64
//! os = linux
//!
//! [tool.cc]
//! name = gcc
//! version = 13.1.0
//! path = /usr/bin/gcc
//! ```

use crate::profile::{Arch, BuildType, HostInfo, Os, Profile, Tool};
use configparser::ini::Ini;
use dop_errors::{Error, ProfileError};
use std::path::Path;

impl Profile {
    /// Load a profile from an INI file
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be parsed, a required key is
    /// missing, or an enum value is unknown.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let display = path.display().to_string();
        let mut ini = Ini::new();
        ini.load(path).map_err(|message| ProfileError::InvalidIni {
            path: display.clone(),
            message,
        })?;

        let get = |section: &str, key: &str| -> Result<String, ProfileError> {
            ini.get(section, key).ok_or_else(|| ProfileError::MissingKey {
                path: display.clone(),
                section: section.to_string(),
                key: key.to_string(),
            })
        };

        let basename = get("main", "basename")?;
        let build_type: BuildType = get("main", "buildtype")?.parse()?;
        let arch: Arch = get("host", "arch")?.parse()?;
        let os: Os = get("host", "os")?.parse()?;

        let mut tools = Vec::new();
        for section in ini.sections() {
            let Some(id) = section.strip_prefix("tool.") else {
                continue;
            };
            let mut tool = Tool::new(
                id,
                get(&section, "name")?,
                get(&section, "version")?,
                get(&section, "path")?,
            );
            tool.msvc_ver = ini.get(&section, "msvc_ver");
            tool.msvc_disp = ini.get(&section, "msvc_disp");
            tools.push(tool);
        }

        Ok(Self::new(basename, HostInfo { arch, os }, build_type, tools))
    }

    /// Write the profile as an INI file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let mut ini = Ini::new();
        ini.set("main", "basename", Some(self.basename.clone()));
        ini.set("main", "buildtype", Some(self.build_type.to_string()));
        ini.set("host", "arch", Some(self.host.arch.to_string()));
        ini.set("host", "os", Some(self.host.os.to_string()));
        for tool in self.tools() {
            let section = format!("tool.{}", tool.id);
            ini.set(&section, "name", Some(tool.name.clone()));
            ini.set(&section, "version", Some(tool.version.clone()));
            ini.set(&section, "path", Some(tool.path.clone()));
            if let Some(ver) = &tool.msvc_ver {
                ini.set(&section, "msvc_ver", Some(ver.clone()));
            }
            if let Some(disp) = &tool.msvc_disp {
                ini.set(&section, "msvc_disp", Some(disp.clone()));
            }
        }
        ini.write(path)
            .map_err(|e| Error::io_with_path(&e, path))?;
        Ok(())
    }
}
