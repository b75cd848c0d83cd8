//! Closed set of outcomes the reconcilers report.
//!
//! Both registries match exhaustively on these, so adding a variant fails to
//! compile until every table maps it.

/// Outcome of a whole reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassReason {
    /// Every managed resource is in the desired state.
    ResourcesReady,
    /// A pass has started converging resources.
    ProgressingResources,
    /// At least one managed resource could not be converged.
    ResourcesFailed,
}

/// Outcome of one transition of the per-resource state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceReason {
    /// The object was absent and has been created.
    Created,
    /// Creating the absent object failed.
    CreateFailed,
    /// An existing object without our owner reference was adopted.
    Adopted,
    /// The object's managed fields differ from the desired state.
    OutOfSync,
    /// A drifted object has been updated back to the desired state.
    Reconciled,
    /// Updating the object failed.
    UpdateFailed,
}

#[cfg(test)]
impl ResourceReason {
    pub(crate) const ALL: [ResourceReason; 6] = [
        ResourceReason::Created,
        ResourceReason::CreateFailed,
        ResourceReason::Adopted,
        ResourceReason::OutOfSync,
        ResourceReason::Reconciled,
        ResourceReason::UpdateFailed,
    ];
}

#[cfg(test)]
impl PassReason {
    pub(crate) const ALL: [PassReason; 3] = [
        PassReason::ResourcesReady,
        PassReason::ProgressingResources,
        PassReason::ResourcesFailed,
    ];
}
