//! Per-resource loading task state machine.

use async_executor::Task;

use lodestone_core::alloc::HashSet;

use crate::catalog::{Catalog, ResourcePayload};
use crate::descriptor::AssetDescriptor;
use crate::error::AssetResult;
use crate::loader::LoadContext;
use crate::registry::Loader;
use crate::resolver::ResolvedFile;
use crate::worker::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskPhase {
    /// Dependencies not discovered yet.
    Start,
    /// Dependency descriptors handed to the scheduler; child loads in flight.
    AwaitingDependencies,
    /// Worker-phase job submitted; polling for completion.
    AwaitingWorker,
    /// Finished resource produced.
    Complete,
    /// Pulled without producing a resource.
    Cancelled,
}

/// What a single advance of a task produced.
#[derive(Debug)]
pub(crate) enum TaskStep {
    /// The task discovered dependencies; resolve them before advancing again.
    Dependencies(Vec<AssetDescriptor>),
    /// Waiting on the worker phase; check again on the next update.
    Pending,
    /// The finished resource, ready for the catalog.
    Loaded(ResourcePayload),
    /// The task observed its cancel request and is done.
    Cancelled,
}

/// Drives one loader capability through its protocol, one step per
/// scheduler update. Created when a descriptor is promoted off the queue,
/// destroyed on completion or cancellation.
pub(crate) struct LoadingTask {
    pub(crate) descriptor: AssetDescriptor,
    /// Whether this task came from an explicit load request rather than
    /// dependency injection; drives the to-load counter on discard.
    pub(crate) from_queue: bool,
    loader: Loader,
    file: ResolvedFile,
    phase: TaskPhase,
    cancel: bool,
    partial_unloaded: bool,
    job: Option<Task<AssetResult<()>>>,
}

impl LoadingTask {
    pub(crate) fn new(
        descriptor: AssetDescriptor,
        loader: Loader,
        file: ResolvedFile,
        from_queue: bool,
    ) -> Self {
        Self {
            descriptor,
            from_queue,
            loader,
            file,
            phase: TaskPhase::Start,
            cancel: false,
            partial_unloaded: false,
            job: None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Mark the task for cancellation; observed on the next advance.
    pub(crate) fn request_cancel(&mut self) {
        self.cancel = true;
    }

    /// Advance the state machine by one step.
    pub(crate) fn advance(
        &mut self,
        catalog: &Catalog,
        pool: &WorkerPool,
    ) -> AssetResult<TaskStep> {
        if self.cancel {
            return Ok(self.finish_cancel());
        }

        match self.phase {
            TaskPhase::Start => {
                let deps = self
                    .loader
                    .dependencies(self.descriptor.name(), &self.file, self.descriptor.params());
                let deps = dedupe_by_name(deps.unwrap_or_default());
                if deps.is_empty() {
                    self.begin_payload(catalog, pool)
                } else {
                    tracing::debug!(
                        name = self.descriptor.name(),
                        count = deps.len(),
                        "task discovered dependencies"
                    );
                    self.phase = TaskPhase::AwaitingDependencies;
                    Ok(TaskStep::Dependencies(deps))
                }
            }
            // The scheduler only advances the top of the task stack, so
            // reaching this again means every child task has completed.
            TaskPhase::AwaitingDependencies => self.begin_payload(catalog, pool),
            TaskPhase::AwaitingWorker => {
                if !self.job.as_ref().is_some_and(Task::is_finished) {
                    return Ok(TaskStep::Pending);
                }
                let job = self.job.take().expect("worker job vanished");
                futures_lite::future::block_on(job)?;

                let Loader::Async(loader) = self.loader.clone() else {
                    unreachable!("worker phase on a synchronous loader");
                };
                let ctx = LoadContext {
                    catalog,
                    descriptor: &self.descriptor,
                    file: &self.file,
                };
                let payload = loader.finish(&ctx)?;
                self.phase = TaskPhase::Complete;
                Ok(TaskStep::Loaded(payload))
            }
            TaskPhase::Complete | TaskPhase::Cancelled => {
                debug_assert!(false, "advanced a finished task");
                Ok(TaskStep::Pending)
            }
        }
    }

    /// Discard the task without producing a resource: cancels any pending
    /// worker job and runs the partial-unload hook exactly once.
    pub(crate) fn abort(&mut self) {
        self.finish_cancel();
    }

    fn begin_payload(&mut self, catalog: &Catalog, pool: &WorkerPool) -> AssetResult<TaskStep> {
        match self.loader.clone() {
            Loader::Sync(loader) => {
                let ctx = LoadContext {
                    catalog,
                    descriptor: &self.descriptor,
                    file: &self.file,
                };
                let payload = loader.load(&ctx)?;
                self.phase = TaskPhase::Complete;
                Ok(TaskStep::Loaded(payload))
            }
            Loader::Async(loader) => {
                let name = self.descriptor.name().to_string();
                let file = self.file.clone();
                let params = self.descriptor.params().cloned();
                let job = pool.spawn(async move { loader.run_worker(&name, &file, params.as_ref()) });
                self.job = Some(job);
                self.phase = TaskPhase::AwaitingWorker;
                Ok(TaskStep::Pending)
            }
        }
    }

    fn finish_cancel(&mut self) -> TaskStep {
        // Dropping the handle cancels a job the pool has not started yet.
        self.job = None;
        if let Loader::Async(loader) = &self.loader
            && !self.partial_unloaded
        {
            self.partial_unloaded = true;
            loader.unload_partial(self.descriptor.name());
        }
        self.phase = TaskPhase::Cancelled;
        TaskStep::Cancelled
    }
}

fn dedupe_by_name(deps: Vec<AssetDescriptor>) -> Vec<AssetDescriptor> {
    let mut seen: HashSet<String> = HashSet::new();
    deps.into_iter()
        .filter(|d| seen.insert(d.name().to_string()))
        .collect()
}
