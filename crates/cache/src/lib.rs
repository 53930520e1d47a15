#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Local package storage for dopamine
//!
//! The user's dop home holds recipe trees downloaded from the registry,
//! dub packages, and profile definitions:
//!
//! ```text
//! <home>/cache/<pkg>/<ver>/<rev>/      recipe tree
//! <home>/cache/<pkg>/<ver>/<rev>.lock  advisory lock
//! <home>/dub-cache/<pkg>/<ver>/        dub packages (no revision level)
//! <home>/profiles/<name>.ini           profiles
//! ```
//!
//! System packages are not stored here; they are discovered on demand
//! through `pkg-config`.

mod cache;
mod dub;
mod extract;
mod home;
mod lock;
mod system;

pub use cache::{CachedRevision, PackageCache};
pub use dub::DubCache;
pub use extract::extract_tar_xz;
pub use home::DopHome;
pub use lock::LockFile;
pub use system::pkg_config_version;
