//! Samtest controller.
//!
//! Reconciles a Samtest by converging every managed object concurrently and
//! then reporting the outcome of the pass through status conditions.

use super::ReconcileAction;
use super::client::ClusterClient;
use super::conditions::{ConditionRegistry, DefaultConditions, READY};
use super::events::{DefaultEvents, EventEmitter, EventRegistry};
use super::reason::PassReason;
use super::resource::{PassContext, ResourceOutcome, ResourceSet};
use crate::crd::{Samtest, SamtestCondition, SamtestStatus};
use crate::error::{OperatorError, OperatorResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Controller for Samtest resources.
pub struct SamtestController<C> {
    client: Arc<C>,
    resources: ResourceSet<C>,
    conditions: Arc<dyn ConditionRegistry>,
    events: Arc<dyn EventRegistry>,
    resync: Option<Duration>,
}

impl<C: ClusterClient> SamtestController<C> {
    /// Create a controller managing the standard resource set with the stock
    /// condition and event tables.
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            resources: ResourceSet::standard(),
            conditions: Arc::new(DefaultConditions),
            events: Arc::new(DefaultEvents),
            resync: None,
        }
    }

    /// Replace the managed resource set.
    pub fn with_resources(mut self, resources: ResourceSet<C>) -> Self {
        self.resources = resources;
        self
    }

    /// Replace the condition table.
    pub fn with_conditions(mut self, conditions: Arc<dyn ConditionRegistry>) -> Self {
        self.conditions = conditions;
        self
    }

    /// Replace the event table.
    pub fn with_events(mut self, events: Arc<dyn EventRegistry>) -> Self {
        self.events = events;
        self
    }

    /// Requeue a Ready record after `interval`. `None` waits for changes only.
    pub fn with_resync(mut self, interval: Option<Duration>) -> Self {
        self.resync = interval;
        self
    }

    /// Reconcile the Samtest `namespace/name`.
    ///
    /// 1. Loads the record; a missing record or a suspended one ends the pass.
    /// 2. Marks the record `Progressing`, unless it is already Ready for its
    ///    current generation.
    /// 3. Converges every managed object concurrently and waits for all.
    /// 4. Applies the per-object conditions and either `Ready` or `Failed`,
    ///    then writes status once if anything changed.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> OperatorResult<ReconcileAction> {
        let Some(mut record) = self.client.get_record(namespace, name).await? else {
            tracing::debug!(
                namespace = %namespace,
                name = %name,
                "Samtest not found, nothing to do"
            );
            return Ok(ReconcileAction::Done);
        };

        if record.spec.suspend {
            tracing::info!(namespace = %namespace, name = %name, "Samtest suspended, skipping");
            return Ok(ReconcileAction::Done);
        }

        tracing::info!(
            namespace = %namespace,
            name = %name,
            image = %record.spec.image,
            replicas = record.spec.replicas,
            "Reconciling Samtest"
        );

        if !is_settled(&record) {
            match self.mark_progressing(&record).await {
                Ok(Some(updated)) => record = updated,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "Failed to mark Samtest progressing");
                }
            }
        }

        let record = Arc::new(record);
        let outcomes = self.converge(Arc::clone(&record)).await;
        self.finish(&record, outcomes).await
    }

    async fn mark_progressing(&self, record: &Samtest) -> OperatorResult<Option<Samtest>> {
        let mut status = record.status.clone().unwrap_or_default();
        let changed = self.apply_pass(
            &mut status,
            PassReason::ProgressingResources,
            record.metadata.generation,
            Utc::now(),
        );
        if !changed {
            return Ok(None);
        }
        self.write_status(record, status).await.map(Some)
    }

    /// Run one sub-reconcile per descriptor and wait for every one of them.
    ///
    /// Outcomes are returned in completion order, each tagged with its
    /// descriptor index.
    async fn converge(&self, record: Arc<Samtest>) -> Vec<(usize, ResourceOutcome)> {
        let pass = PassContext {
            client: Arc::clone(&self.client),
            record: Arc::clone(&record),
            events: EventEmitter::new(Arc::clone(&self.client), Arc::clone(&self.events)),
        };

        let bound = self.resources.bind(&record);
        let mut outcomes = Vec::with_capacity(bound.len());
        let mut tasks = JoinSet::new();

        for (index, resource) in bound.into_iter().enumerate() {
            let pass = pass.clone();
            tasks.spawn(async move { (index, resource.run(&pass).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    let cause = if e.is_panic() {
                        "task panicked".to_string()
                    } else {
                        e.to_string()
                    };
                    tracing::error!(error = %cause, "Resource reconcile task failed");
                    let lost = ResourceOutcome::lost(OperatorError::TaskJoin(cause));
                    outcomes.push((usize::MAX, lost));
                }
            }
        }

        outcomes
    }

    async fn finish(
        &self,
        record: &Samtest,
        mut outcomes: Vec<(usize, ResourceOutcome)>,
    ) -> OperatorResult<ReconcileAction> {
        let name = record.metadata.name.as_deref().unwrap_or_default();
        let namespace = record.metadata.namespace.as_deref().unwrap_or_default();
        let generation = record.metadata.generation;
        let now = Utc::now();

        let first_error = outcomes.iter_mut().find_map(|(_, o)| o.error.take());

        outcomes.sort_by_key(|(index, _)| *index);
        let mut status = record.status.clone().unwrap_or_default();
        let mut changed = false;
        for condition in self.final_conditions(&outcomes, namespace, generation) {
            changed |= status.set_condition(condition, now);
        }

        match first_error {
            Some(error) => {
                changed |=
                    self.apply_pass(&mut status, PassReason::ResourcesFailed, generation, now);
                tracing::error!(name = %name, error = %error, "Samtest reconcile failed");
                if changed {
                    if let Err(e) = self.write_status(record, status).await {
                        tracing::error!(name = %name, error = %e, "Failed to record failed status");
                    }
                }
                Err(error)
            }
            None => {
                changed |=
                    self.apply_pass(&mut status, PassReason::ResourcesReady, generation, now);
                if status.observed_generation != generation {
                    status.observed_generation = generation;
                    changed = true;
                }
                if changed {
                    self.write_status(record, status).await?;
                }
                tracing::info!(name = %name, "Samtest reconciled");
                Ok(self
                    .resync
                    .map_or(ReconcileAction::Done, ReconcileAction::Requeue))
            }
        }
    }

    /// The last condition each condition type reaches during the pass.
    ///
    /// Intermediate states (`OutOfSync` before `Reconciled`) never reach the
    /// stored status, so a type that ends where it started keeps its
    /// `lastTransitionTime`.
    fn final_conditions(
        &self,
        outcomes: &[(usize, ResourceOutcome)],
        namespace: &str,
        generation: Option<i64>,
    ) -> Vec<SamtestCondition> {
        let mut conditions: Vec<SamtestCondition> = Vec::new();
        for (_, outcome) in outcomes {
            for reason in &outcome.transitions {
                let condition = self
                    .conditions
                    .resource_condition(*reason, outcome.kind, namespace, &outcome.name)
                    .into_condition(generation);
                match conditions
                    .iter_mut()
                    .find(|c| c.condition_type == condition.condition_type)
                {
                    Some(existing) => *existing = condition,
                    None => conditions.push(condition),
                }
            }
        }
        conditions
    }

    fn apply_pass(
        &self,
        status: &mut SamtestStatus,
        reason: PassReason,
        generation: Option<i64>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut changed = false;
        for template in self.conditions.pass_transition(reason) {
            changed |= status.set_condition(template.into_condition(generation), now);
        }
        changed
    }

    async fn write_status(
        &self,
        record: &Samtest,
        status: SamtestStatus,
    ) -> OperatorResult<Samtest> {
        let mut updated = record.clone();
        updated.status = Some(status);
        self.client.update_record_status(&updated).await
    }
}

/// Whether the record already reports Ready for its current generation.
fn is_settled(record: &Samtest) -> bool {
    record.status.as_ref().is_some_and(|status| {
        status.is_true(READY) && status.observed_generation == record.metadata.generation
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::conditions::{FAILED, PROGRESSING};
    use crate::resources::fixtures::record;
    use crate::testing::{Failure, InMemoryCluster, Verb};

    fn controller(cluster: &Arc<InMemoryCluster>) -> SamtestController<InMemoryCluster> {
        SamtestController::new(Arc::clone(cluster))
    }

    #[tokio::test]
    async fn missing_record_is_done() {
        let cluster = Arc::new(InMemoryCluster::new());
        let action = controller(&cluster).reconcile("default", "ghost").await.unwrap();
        assert!(matches!(action, ReconcileAction::Done));
        assert_eq!(cluster.write_count(), 0);
    }

    #[tokio::test]
    async fn first_pass_marks_progressing_then_ready() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.insert_record(record("sample", "app:1.2", 2));

        controller(&cluster).reconcile("default", "sample").await.unwrap();

        // Progressing, then the final verdict.
        assert_eq!(cluster.writes_of(Verb::UpdateStatus).len(), 2);
        let status = cluster.record("default", "sample").unwrap().status.unwrap();
        assert!(status.is_true(READY));
        assert!(!status.is_true(PROGRESSING));
        assert!(!status.is_true(FAILED));
        assert_eq!(status.observed_generation, Some(1));
        assert!(status.is_true("DeploymentSynced"));
        assert!(status.is_true("ServiceSynced"));
    }

    #[tokio::test]
    async fn progressing_write_failure_does_not_stop_the_pass() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.insert_record(record("sample", "app:1.2", 2));
        cluster.fail(Failure::new(Verb::UpdateStatus));

        let result = controller(&cluster).reconcile("default", "sample").await;

        // Objects are created even though every status write fails.
        assert!(result.is_err());
        assert_eq!(cluster.writes_of(Verb::Create).len(), 2);
    }

    #[tokio::test]
    async fn resync_interval_requeues() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.insert_record(record("sample", "app:1.2", 1));

        let action = controller(&cluster)
            .with_resync(Some(Duration::from_secs(300)))
            .reconcile("default", "sample")
            .await
            .unwrap();

        assert!(matches!(action, ReconcileAction::Requeue(d) if d == Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn empty_resource_set_goes_ready() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.insert_record(record("sample", "app:1.2", 1));

        controller(&cluster)
            .with_resources(ResourceSet::new())
            .reconcile("default", "sample")
            .await
            .unwrap();

        let status = cluster.record("default", "sample").unwrap().status.unwrap();
        assert!(status.is_true(READY));
        assert_eq!(cluster.writes_of(Verb::Create).len(), 0);
    }

    #[test]
    fn settled_requires_current_generation() {
        let mut r = record("sample", "app:1.2", 1);
        assert!(!is_settled(&r));

        let mut status = SamtestStatus::default();
        for t in DefaultConditions.pass_transition(PassReason::ResourcesReady) {
            status.set_condition(t.into_condition(Some(1)), Utc::now());
        }
        status.observed_generation = Some(1);
        r.status = Some(status);
        assert!(is_settled(&r));

        r.metadata.generation = Some(2);
        assert!(!is_settled(&r));
    }
}
