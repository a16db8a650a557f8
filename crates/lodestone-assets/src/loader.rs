//! Loader capability traits.
//!
//! A loader turns a resolved file into a resource payload. Two shapes exist:
//! synchronous loaders do everything on the owner thread in one call, while
//! asynchronous loaders split the work into a worker-pool phase
//! ([`AsyncAssetLoader::run_worker`]) and an owner-thread finishing phase
//! ([`AsyncAssetLoader::finish`]). Which shape a registration uses is
//! decided once, at registration time, via the [`Loader`](crate::Loader) tag.

use std::sync::Arc;

use crate::Asset;
use crate::catalog::{Catalog, ResourcePayload};
use crate::descriptor::{AssetDescriptor, LoaderParams};
use crate::error::AssetResult;
use crate::resolver::ResolvedFile;

/// Context handed to loader calls that run on the owner thread.
///
/// Gives the loader its resolved file and parameters plus read access to
/// already-loaded resources, which is how a loader picks up the
/// dependencies it declared earlier.
pub struct LoadContext<'a> {
    pub(crate) catalog: &'a Catalog,
    pub(crate) descriptor: &'a AssetDescriptor,
    pub(crate) file: &'a ResolvedFile,
}

impl<'a> LoadContext<'a> {
    /// The name of the asset being loaded.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// The resolved file for the asset being loaded.
    pub fn file(&self) -> &ResolvedFile {
        self.file
    }

    /// The loader parameters attached to the request, if any.
    pub fn params(&self) -> Option<&Arc<LoaderParams>> {
        self.descriptor.params()
    }

    /// Downcast the attached parameters to `P`.
    pub fn params_as<P: std::any::Any>(&self) -> Option<&P> {
        self.descriptor.params_as::<P>()
    }

    /// Fetch an already-loaded dependency by name.
    pub fn dependency<T: Asset>(&self, name: &str) -> Option<Arc<T>> {
        self.catalog.get::<T>(name)
    }
}

/// A loader that produces its resource in a single owner-thread call.
pub trait SyncAssetLoader: Send + Sync + 'static {
    /// The dependency descriptors this asset needs loaded first.
    ///
    /// Called once per load, before [`SyncAssetLoader::load`]. Returning
    /// `None` (the default) means no dependencies.
    fn dependencies(
        &self,
        _name: &str,
        _file: &ResolvedFile,
        _params: Option<&Arc<LoaderParams>>,
    ) -> Option<Vec<AssetDescriptor>> {
        None
    }

    /// Produce the resource. Dependencies declared earlier are available
    /// through the context.
    fn load(&self, ctx: &LoadContext<'_>) -> AssetResult<ResourcePayload>;
}

/// A loader whose heavy phase runs on the background worker pool.
pub trait AsyncAssetLoader: Send + Sync + 'static {
    /// The dependency descriptors this asset needs loaded first.
    fn dependencies(
        &self,
        _name: &str,
        _file: &ResolvedFile,
        _params: Option<&Arc<LoaderParams>>,
    ) -> Option<Vec<AssetDescriptor>> {
        None
    }

    /// The worker-phase call. Runs on a pool thread; must stash its result
    /// in the loader (or a side table) for [`AsyncAssetLoader::finish`] to
    /// pick up. Never touches the catalog.
    fn run_worker(
        &self,
        name: &str,
        file: &ResolvedFile,
        params: Option<&Arc<LoaderParams>>,
    ) -> AssetResult<()>;

    /// The finishing call. Runs on the owner thread, strictly after the
    /// worker phase reported completion.
    fn finish(&self, ctx: &LoadContext<'_>) -> AssetResult<ResourcePayload>;

    /// Discard partial work after a cancelled load. Invoked exactly once
    /// per cancelled task.
    fn unload_partial(&self, _name: &str) {}
}
