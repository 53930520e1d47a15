#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core value types shared across the dopamine crates
//!
//! Versions are plain [`semver::Version`]; everything the resolver and the
//! build layer agree on (names, constraints, option sets, dependency specs)
//! lives here so the leaf crates stay decoupled.

mod dep;
mod name;
mod options;
mod version;

pub use dep::{AvailVersion, DepKind, DepLocation, DepSpec};
pub use name::PackageName;
pub use options::OptionSet;
pub use version::{Constraint, ConstraintOp, VersionSpec};

pub use semver::Version;
