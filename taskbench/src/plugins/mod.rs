//! Plugins bundle task kinds and default tasks that can be applied to a project.

pub mod helm;

use anyhow::Result;

use crate::project::Project;

pub use helm::{HelmLint, HelmPackage, HelmPlugin};

/// Something that configures a project: registers kinds, tasks or properties.
pub trait Plugin {
    /// Stable identifier; a project applies each id at most once.
    fn id(&self) -> &str;

    fn apply(&self, project: &mut Project) -> Result<()>;
}
