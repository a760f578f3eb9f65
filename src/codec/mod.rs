//! Translation between the in-memory resource model and Fleet wire formats.

mod package_policy;
mod vars;

pub use package_policy::{
    Legacy, PackagePolicy, PackagePolicyInput, PackagePolicyStream, PackageRef, Simplified,
    WireFormat, select_wire_format,
};
pub use vars::{Var, VarKind, VarValue, Vars};
