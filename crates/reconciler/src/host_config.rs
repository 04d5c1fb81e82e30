//! Host operations the commit pipeline drives.

use crate::element::Props;
use anyhow::Result;
use core::fmt::Debug;

/// A host tree the reconciler renders into.
///
/// Instances are opaque handles; the reconciler only stores and passes them
/// back. `create_*` and `append_initial_child` run while completing a render
/// and must not touch the attached tree. Everything else runs during commit.
pub trait HostConfig {
    /// Handle to a host node. Containers are instances too.
    type Instance: Clone + Debug;

    /// Create a detached element.
    fn create_instance(&mut self, tag: &str, props: &Props) -> Result<Self::Instance>;

    /// Create a detached text node.
    fn create_text_instance(&mut self, text: &str) -> Result<Self::Instance>;

    /// Build up a detached subtree.
    fn append_initial_child(&mut self, parent: &Self::Instance, child: &Self::Instance) -> Result<()>;

    /// Append `child` as the last child of `parent`, moving it if already attached.
    fn append_child(&mut self, parent: &Self::Instance, child: &Self::Instance) -> Result<()>;

    /// Insert `child` before `before`, moving it if already attached.
    fn insert_before(
        &mut self,
        parent: &Self::Instance,
        child: &Self::Instance,
        before: &Self::Instance,
    ) -> Result<()>;

    fn remove_child(&mut self, parent: &Self::Instance, child: &Self::Instance) -> Result<()>;

    fn commit_text_update(&mut self, instance: &Self::Instance, old_text: &str, new_text: &str) -> Result<()>;

    /// Apply changed properties. The diff format is up to the host.
    fn commit_update(&mut self, instance: &Self::Instance, old_props: &Props, new_props: &Props) -> Result<()>;

    /// Called once after each commit's mutations.
    fn reset_after_commit(&mut self) {}
}
