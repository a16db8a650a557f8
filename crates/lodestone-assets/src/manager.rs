//! The asset manager: queue admission, the update loop, and the public API.

use std::any::TypeId;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use lodestone_core::alloc::HashSet;

use crate::Asset;
use crate::catalog::{Catalog, ResourcePayload};
use crate::dependency::DependencyTracker;
use crate::descriptor::{AssetDescriptor, FinishedCallback};
use crate::error::{AssetError, AssetResult};
use crate::registry::{Loader, LoaderRegistry};
use crate::resolver::{FileResolver, FsResolver};
use crate::task::{LoadingTask, TaskStep};
use crate::worker::WorkerPool;

/// Listener invoked when a load fails mid-update. Without one, the error is
/// returned from [`AssetManager::update`] instead.
pub type ErrorListener = Arc<dyn Fn(&AssetManager, &AssetDescriptor, &AssetError) + Send + Sync>;

/// Callback invocations collected under the state lock and run after it is
/// released, so user code may call back into the manager.
enum DeferredCall {
    Finished(FinishedCallback, String, TypeId),
    Error(ErrorListener, AssetDescriptor, AssetError),
}

/// The four core tables guarded as one unit.
struct State {
    catalog: Catalog,
    tracker: DependencyTracker,
    queue: VecDeque<AssetDescriptor>,
    /// In-flight tasks as a stack; the top is the active task. Dependency
    /// tasks are pushed above their parent, so a dependency always
    /// completes before the task that introduced it.
    tasks: Vec<LoadingTask>,
    to_load: usize,
    loaded: usize,
    /// Tasks created since the stack was last empty; the denominator for
    /// the in-flight fraction of progress.
    peak_tasks: usize,
    error_listener: Option<ErrorListener>,
}

/// Loads named resources through registered loader capabilities, tracks
/// dependencies between them, and reference-counts shared resources.
///
/// One owner thread drives loading by calling [`AssetManager::update`]
/// repeatedly; it never blocks except in the `finish_loading` variants.
/// Every instance is independent; there is no process-wide default.
pub struct AssetManager {
    state: Mutex<State>,
    registry: RwLock<LoaderRegistry>,
    resolver: Box<dyn FileResolver>,
    pool: WorkerPool,
}

impl AssetManager {
    /// Create a manager resolving names against a base directory.
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self::with_resolver(FsResolver::new(base_path))
    }

    /// Create a manager with a custom file resolver.
    pub fn with_resolver(resolver: impl FileResolver + 'static) -> Self {
        Self {
            state: Mutex::new(State {
                catalog: Catalog::new(),
                tracker: DependencyTracker::new(),
                queue: VecDeque::new(),
                tasks: Vec::new(),
                to_load: 0,
                loaded: 0,
                peak_tasks: 0,
                error_listener: None,
            }),
            registry: RwLock::new(LoaderRegistry::new()),
            resolver: Box::new(resolver),
            pool: WorkerPool::new(1),
        }
    }

    // ------------------------------------------------------------------
    // Registration & configuration
    // ------------------------------------------------------------------

    /// Register a loader for assets of type `T` with a filename suffix.
    ///
    /// The empty suffix registers the default loader for the type. Fails if
    /// the exact (type, suffix) pair is already registered.
    pub fn register_loader<T: Asset>(&self, suffix: &str, loader: Loader) -> AssetResult<()> {
        self.registry
            .write()
            .expect("loader registry lock poisoned")
            .register(TypeId::of::<T>(), T::type_name(), suffix, loader)
    }

    /// Install the error listener invoked on load failures.
    pub fn set_error_listener(
        &self,
        listener: impl Fn(&AssetManager, &AssetDescriptor, &AssetError) + Send + Sync + 'static,
    ) {
        self.lock_state().error_listener = Some(Arc::new(listener));
    }

    /// Remove the error listener; failures are returned from `update` again.
    pub fn clear_error_listener(&self) {
        self.lock_state().error_listener = None;
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Queue an asset of type `T` for loading.
    pub fn load<T: Asset>(&self, name: impl Into<String>) -> AssetResult<()> {
        self.load_with(AssetDescriptor::new::<T>(name))
    }

    /// Queue a load request built from a full descriptor.
    ///
    /// Fails with [`AssetError::NotFound`] if the file cannot be resolved,
    /// or [`AssetError::TypeConflict`] if the name is already known under a
    /// different type. Requesting an already-loaded name bumps its
    /// reference count (and, transitively, its recorded dependencies) and
    /// completes immediately.
    pub fn load_with(&self, descriptor: AssetDescriptor) -> AssetResult<()> {
        let mut deferred = Vec::new();
        let result = self.admit(&mut self.lock_state(), descriptor, &mut deferred);
        self.run_deferred(deferred);
        result
    }

    fn admit(
        &self,
        state: &mut State,
        descriptor: AssetDescriptor,
        deferred: &mut Vec<DeferredCall>,
    ) -> AssetResult<()> {
        let name = descriptor.name();

        // Already loaded: an explicit reference bump, no task.
        if let Some((type_id, type_name)) = state.catalog.type_of(name) {
            if type_id != descriptor.type_id() {
                return Err(AssetError::TypeConflict {
                    name: name.to_string(),
                    expected: type_name,
                    requested: descriptor.type_name(),
                });
            }
            state.catalog.add_ref(name);
            bump_dependency_refs(state, name);
            state.to_load += 1;
            state.loaded += 1;
            tracing::debug!(name, "already loaded, bumped reference count");
            if let Some(callback) = descriptor.callback() {
                deferred.push(DeferredCall::Finished(
                    callback.clone(),
                    name.to_string(),
                    type_id,
                ));
            }
            return Ok(());
        }

        // The same name pending under a different type is a consistency
        // error; under the same type it is a legitimate duplicate request.
        for pending in state.queue.iter().chain(
            state
                .tasks
                .iter()
                .map(|task| &task.descriptor),
        ) {
            if pending.name() == name && pending.type_id() != descriptor.type_id() {
                return Err(AssetError::TypeConflict {
                    name: name.to_string(),
                    expected: pending.type_name(),
                    requested: descriptor.type_name(),
                });
            }
        }

        // Fail fast on unresolvable files.
        self.resolver.resolve(name)?;

        tracing::debug!(name, type_name = descriptor.type_name(), "queued");
        state.queue.push_back(descriptor);
        state.to_load += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Get a loaded asset, or `None` if absent or of a different type.
    pub fn get<T: Asset>(&self, name: &str) -> Option<Arc<T>> {
        self.lock_state().catalog.get::<T>(name)
    }

    /// Get a loaded asset, failing if absent or of a different type.
    pub fn get_required<T: Asset>(&self, name: &str) -> AssetResult<Arc<T>> {
        let state = self.lock_state();
        match state.catalog.type_of(name) {
            None => Err(AssetError::NotLoaded {
                name: name.to_string(),
            }),
            Some((type_id, type_name)) if type_id != TypeId::of::<T>() => {
                Err(AssetError::TypeConflict {
                    name: name.to_string(),
                    expected: type_name,
                    requested: T::type_name(),
                })
            }
            Some(_) => state
                .catalog
                .get::<T>(name)
                .ok_or_else(|| AssetError::NotLoaded {
                    name: name.to_string(),
                }),
        }
    }

    /// All loaded assets of type `T`.
    pub fn get_all<T: Asset>(&self) -> Vec<Arc<T>> {
        self.lock_state().catalog.get_all::<T>()
    }

    /// Whether a name is loaded, under any type.
    pub fn contains(&self, name: &str) -> bool {
        self.lock_state().catalog.contains(name)
    }

    /// Whether a name is loaded as type `T`.
    pub fn is_loaded<T: Asset>(&self, name: &str) -> bool {
        self.lock_state()
            .catalog
            .contains_typed(name, TypeId::of::<T>())
    }

    /// The direct dependencies recorded for a loaded name.
    pub fn dependencies_of(&self, name: &str) -> Option<Vec<String>> {
        self.lock_state()
            .tracker
            .dependencies_of(name)
            .map(|deps| deps.to_vec())
    }

    /// The reference count of a loaded name.
    pub fn ref_count(&self, name: &str) -> AssetResult<u32> {
        self.lock_state()
            .catalog
            .ref_count(name)
            .ok_or_else(|| AssetError::NotLoaded {
                name: name.to_string(),
            })
    }

    /// Overwrite the reference count of a loaded name.
    ///
    /// Setting 0 releases the resource outright, returning one reference
    /// to each recorded dependency; a resource is never left loaded with a
    /// count of zero.
    pub fn set_ref_count(&self, name: &str, refs: u32) -> AssetResult<()> {
        let mut state = self.lock_state();
        if refs == 0 {
            state.catalog.set_ref_count(name, 1)?;
            return self.release_cascade(&mut state, name);
        }
        state.catalog.set_ref_count(name, refs)
    }

    /// Number of requests not yet finished: queued plus in flight.
    pub fn queued_count(&self) -> usize {
        let state = self.lock_state();
        state.queue.len() + state.tasks.len()
    }

    /// Overall progress in `[0, 1]`; 1.0 when nothing was ever queued.
    pub fn progress(&self) -> f32 {
        let state = self.lock_state();
        if state.to_load == 0 {
            return 1.0;
        }
        let mut fractional = state.loaded as f32;
        if state.peak_tasks > 0 {
            fractional +=
                (state.peak_tasks - state.tasks.len()) as f32 / state.peak_tasks as f32;
        }
        (fractional / state.to_load as f32).min(1.0)
    }

    // ------------------------------------------------------------------
    // Unload & cancellation
    // ------------------------------------------------------------------

    /// Release one reference to a name.
    ///
    /// If the name is the active task it is cancelled on the next update;
    /// if it is merely queued it is removed and its completion callback
    /// fires (the request is considered satisfied). Otherwise the catalog
    /// reference count is decremented, along with one reference on each
    /// recorded dependency, recursively. Fails with
    /// [`AssetError::NotLoaded`] for unknown names.
    pub fn unload(&self, name: &str) -> AssetResult<()> {
        let mut deferred = Vec::new();
        let result = {
            let mut state = self.lock_state();

            // Active task: cancel in place.
            if state.tasks.last().is_some_and(|task| task.name() == name) {
                let task = state.tasks.last_mut().expect("active task vanished");
                task.request_cancel();
                tracing::debug!(name, "cancelling active load");
                Ok(())
            } else if let Some(pos) = state.queue.iter().position(|d| d.name() == name) {
                // Queued only: never becomes a task.
                let descriptor = state.queue.remove(pos).expect("queue entry vanished");
                state.to_load = state.to_load.saturating_sub(1);
                tracing::debug!(name, "removed queued load");
                if let Some(callback) = descriptor.callback() {
                    deferred.push(DeferredCall::Finished(
                        callback.clone(),
                        name.to_string(),
                        descriptor.type_id(),
                    ));
                }
                Ok(())
            } else {
                self.release_cascade(&mut state, name)
            }
        };
        self.run_deferred(deferred);
        result
    }

    /// Release one reference to `name` and, once per edge, to each of its
    /// recorded dependencies, depth first with an explicit stack. Every
    /// release returns exactly the references an admission or injection
    /// bump took; edges are dropped only when their owner fully unloads.
    fn release_cascade(&self, state: &mut State, name: &str) -> AssetResult<()> {
        if !state.catalog.contains(name) {
            return Err(AssetError::NotLoaded {
                name: name.to_string(),
            });
        }
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            // Another edge on the stack may have already removed this one.
            if !state.catalog.contains(&current) {
                continue;
            }
            let deps = state
                .tracker
                .dependencies_of(&current)
                .map(|deps| deps.to_vec())
                .unwrap_or_default();
            if state.catalog.release(&current)? {
                tracing::debug!(name = %current, "unloaded");
                state.tracker.remove(&current);
            }
            for dep in deps {
                if state.catalog.contains(&dep) {
                    stack.push(dep);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Update loop
    // ------------------------------------------------------------------

    /// Advance loading by one step.
    ///
    /// Returns `true` when the queue is empty and no task is in flight.
    /// A load failure discards every in-flight task, unwinds the
    /// dependency references they had already taken, and either invokes
    /// the error listener or returns the error; queued descriptors survive
    /// and the next `update` continues with them.
    pub fn update(&self) -> AssetResult<bool> {
        let mut deferred = Vec::new();
        let result = self.update_locked(&mut self.lock_state(), &mut deferred);
        self.run_deferred(deferred);
        result
    }

    /// Repeatedly [`update`](Self::update) until done or the time budget
    /// elapses, yielding between iterations. Returns whether everything
    /// finished within budget.
    pub fn update_for(&self, budget_millis: u64) -> AssetResult<bool> {
        let deadline = Instant::now() + Duration::from_millis(budget_millis);
        loop {
            if self.update()? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::yield_now();
        }
    }

    /// Drive loading until everything queued has finished.
    pub fn finish_loading(&self) -> AssetResult<()> {
        while !self.update()? {
            std::thread::yield_now();
        }
        Ok(())
    }

    /// Drive loading until one specific name is loaded.
    ///
    /// Fails with [`AssetError::NotLoaded`] if loading finishes without
    /// producing the name.
    pub fn finish_loading_asset(&self, name: &str) -> AssetResult<()> {
        loop {
            if self.contains(name) {
                return Ok(());
            }
            let done = self.update()?;
            if done {
                if self.contains(name) {
                    return Ok(());
                }
                return Err(AssetError::NotLoaded {
                    name: name.to_string(),
                });
            }
            std::thread::yield_now();
        }
    }

    fn update_locked(
        &self,
        state: &mut State,
        deferred: &mut Vec<DeferredCall>,
    ) -> AssetResult<bool> {
        if state.tasks.is_empty() {
            while state.tasks.is_empty() && !state.queue.is_empty() {
                let descriptor = state.queue.pop_front().expect("queue entry vanished");
                if let Err(err) = self.promote(state, descriptor, deferred) {
                    // The request is dropped; give back its to-load slot.
                    state.to_load = state.to_load.saturating_sub(1);
                    return Err(err);
                }
            }
            if state.tasks.is_empty() {
                return Ok(true);
            }
        }

        let step = {
            let task = state.tasks.last_mut().expect("no active task");
            task.advance(&state.catalog, &self.pool)
        };

        match step {
            Ok(TaskStep::Pending) => Ok(false),
            Ok(TaskStep::Dependencies(children)) => {
                let parent = state
                    .tasks
                    .last()
                    .expect("parent task vanished")
                    .name()
                    .to_string();
                match self.inject_dependencies(state, &parent, children) {
                    Ok(()) => Ok(false),
                    Err(err) => {
                        let descriptor = state
                            .tasks
                            .last()
                            .expect("parent task vanished")
                            .descriptor
                            .clone();
                        self.handle_failure(state, descriptor, err, deferred)
                    }
                }
            }
            Ok(TaskStep::Loaded(payload)) => {
                let task = state.tasks.pop().expect("completed task vanished");
                self.install(state, &task.descriptor, payload, deferred);
                if state.tasks.is_empty() {
                    state.loaded += 1;
                    state.peak_tasks = 0;
                }
                Ok(state.tasks.is_empty() && state.queue.is_empty())
            }
            Ok(TaskStep::Cancelled) => {
                let task = state.tasks.pop().expect("cancelled task vanished");
                tracing::debug!(name = task.name(), "load cancelled");
                if task.from_queue {
                    state.to_load = state.to_load.saturating_sub(1);
                }
                if state.tasks.is_empty() {
                    state.peak_tasks = 0;
                }
                Ok(state.tasks.is_empty() && state.queue.is_empty())
            }
            Err(err) => {
                let descriptor = state
                    .tasks
                    .last()
                    .expect("failing task vanished")
                    .descriptor
                    .clone();
                self.handle_failure(state, descriptor, err, deferred)
            }
        }
    }

    /// Turn a queued descriptor into a task, or fast-track it if the name
    /// finished loading while it sat in the queue.
    fn promote(
        &self,
        state: &mut State,
        descriptor: AssetDescriptor,
        deferred: &mut Vec<DeferredCall>,
    ) -> AssetResult<()> {
        let name = descriptor.name();

        if let Some((type_id, type_name)) = state.catalog.type_of(name) {
            if type_id != descriptor.type_id() {
                return Err(AssetError::TypeConflict {
                    name: name.to_string(),
                    expected: type_name,
                    requested: descriptor.type_name(),
                });
            }
            state.catalog.add_ref(name);
            bump_dependency_refs(state, name);
            state.loaded += 1;
            tracing::debug!(name, "finished while queued, bumped reference count");
            if let Some(callback) = descriptor.callback() {
                deferred.push(DeferredCall::Finished(
                    callback.clone(),
                    name.to_string(),
                    type_id,
                ));
            }
            return Ok(());
        }

        let loader = self
            .registry
            .read()
            .expect("loader registry lock poisoned")
            .resolve(descriptor.type_id(), descriptor.type_name(), Some(name))?;
        let file = self.resolver.resolve(name)?;

        tracing::debug!(name, type_name = descriptor.type_name(), "starting load");
        state.tasks.push(LoadingTask::new(descriptor, loader, file, true));
        state.peak_tasks += 1;
        Ok(())
    }

    /// Resolve freshly discovered dependencies: record edges, bump
    /// already-loaded children, and push tasks for the rest above their
    /// parent so they complete first.
    fn inject_dependencies(
        &self,
        state: &mut State,
        parent: &str,
        children: Vec<AssetDescriptor>,
    ) -> AssetResult<()> {
        for child in children {
            let name = child.name().to_string();

            if let Some((type_id, type_name)) = state.catalog.type_of(&name) {
                if type_id != child.type_id() {
                    return Err(AssetError::TypeConflict {
                        name,
                        expected: type_name,
                        requested: child.type_name(),
                    });
                }
                state.tracker.record(parent, &name);
                state.catalog.add_ref(&name);
                bump_dependency_refs(state, &name);
                tracing::debug!(name, parent, "dependency already loaded");
                continue;
            }

            // Pending under a different type violates name/type consistency.
            for pending in state.queue.iter().chain(
                state
                    .tasks
                    .iter()
                    .map(|task| &task.descriptor),
            ) {
                if pending.name() == name && pending.type_id() != child.type_id() {
                    return Err(AssetError::TypeConflict {
                        name,
                        expected: pending.type_name(),
                        requested: child.type_name(),
                    });
                }
            }

            let loader = self
                .registry
                .read()
                .expect("loader registry lock poisoned")
                .resolve(child.type_id(), child.type_name(), Some(&name))?;
            let file = self.resolver.resolve(&name)?;

            tracing::debug!(name, parent, "loading dependency");
            state.tracker.record(parent, &name);
            state.tasks.push(LoadingTask::new(child, loader, file, false));
            state.peak_tasks += 1;
        }
        Ok(())
    }

    /// Hand a finished resource to the catalog and fire its callback.
    fn install(
        &self,
        state: &mut State,
        descriptor: &AssetDescriptor,
        payload: ResourcePayload,
        deferred: &mut Vec<DeferredCall>,
    ) {
        let name = descriptor.name();
        if state.catalog.contains(name) {
            // A duplicate request finished first; count one more owner.
            state.catalog.add_ref(name);
        } else {
            state.catalog.add(
                name,
                descriptor.type_id(),
                descriptor.type_name(),
                payload,
                1,
            );
        }
        tracing::debug!(name, type_name = descriptor.type_name(), "loaded");
        if let Some(callback) = descriptor.callback() {
            deferred.push(DeferredCall::Finished(
                callback.clone(),
                name.to_string(),
                descriptor.type_id(),
            ));
        }
    }

    /// A task step failed: discard every in-flight task, unwind the
    /// dependency references they took, and route the error.
    fn handle_failure(
        &self,
        state: &mut State,
        descriptor: AssetDescriptor,
        err: AssetError,
        deferred: &mut Vec<DeferredCall>,
    ) -> AssetResult<bool> {
        tracing::error!(name = descriptor.name(), error = %err, "load failed");

        let mut tasks = std::mem::take(&mut state.tasks);
        for task in tasks.iter_mut() {
            task.abort();
            if task.from_queue {
                state.to_load = state.to_load.saturating_sub(1);
            }
            if let Some(deps) = state.tracker.remove(task.name()) {
                for dep in deps {
                    if state.catalog.contains(&dep) {
                        self.release_cascade(state, &dep)?;
                    }
                }
            }
        }
        state.peak_tasks = 0;

        match state.error_listener.clone() {
            Some(listener) => {
                deferred.push(DeferredCall::Error(listener, descriptor, err));
                Ok(state.queue.is_empty())
            }
            None => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Cancel all pending work and release every loaded resource, roots
    /// first so innermost dependencies are disposed last.
    pub fn clear(&self) -> AssetResult<()> {
        let mut state = self.lock_state();

        state.queue.clear();
        let mut tasks = std::mem::take(&mut state.tasks);
        for task in tasks.iter_mut() {
            task.abort();
        }
        drop(tasks);

        while !state.catalog.is_empty() {
            // Snapshot before mutating any counts.
            let names = state.catalog.names();
            let referenced: HashSet<String> = state
                .tracker
                .referenced_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let roots: Vec<&String> =
                names.iter().filter(|n| !referenced.contains(*n)).collect();

            if roots.is_empty() {
                tracing::warn!("dependency cycle while clearing; forcing release");
                for name in &names {
                    if state.catalog.contains(name) {
                        state.catalog.set_ref_count(name, 1)?;
                        state.catalog.release(name)?;
                        state.tracker.remove(name);
                    }
                }
                break;
            }

            for root in roots {
                if state.catalog.contains(root) {
                    self.release_cascade(&mut state, root)?;
                }
            }
        }

        state.to_load = 0;
        state.loaded = 0;
        state.peak_tasks = 0;
        Ok(())
    }

    // ------------------------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("asset manager state lock poisoned")
    }

    fn run_deferred(&self, calls: Vec<DeferredCall>) {
        for call in calls {
            match call {
                DeferredCall::Finished(callback, name, type_id) => {
                    callback(self, &name, type_id);
                }
                DeferredCall::Error(listener, descriptor, err) => {
                    listener(self, &descriptor, &err);
                }
            }
        }
    }
}

impl Drop for AssetManager {
    fn drop(&mut self) {
        if let Err(err) = self.clear() {
            tracing::warn!(error = %err, "failed to release assets on drop");
        }
    }
}

/// Bump the recorded dependencies of `name`, per edge, depth first with an
/// explicit stack. A dependency reachable through two edges is counted
/// twice, keeping the count symmetric with cascade release.
fn bump_dependency_refs(state: &mut State, name: &str) {
    let mut stack: Vec<String> = state
        .tracker
        .dependencies_of(name)
        .map(|deps| deps.to_vec())
        .unwrap_or_default();
    while let Some(dep) = stack.pop() {
        if state.catalog.add_ref(&dep)
            && let Some(deps) = state.tracker.dependencies_of(&dep)
        {
            stack.extend(deps.iter().cloned());
        }
    }
}
