//! Load request descriptors.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::Asset;
use crate::manager::AssetManager;

/// Opaque loader parameters attached to a descriptor.
///
/// Loaders downcast these to their own parameter type.
pub type LoaderParams = dyn Any + Send + Sync;

/// Per-descriptor completion callback, invoked once the asset (or an
/// equivalent already-loaded copy) is available.
pub type FinishedCallback = Arc<dyn Fn(&AssetManager, &str, TypeId) + Send + Sync>;

/// A request to load one named resource.
///
/// Descriptors are immutable once created. Two descriptors with the same
/// name must carry the same runtime type; the manager rejects mismatches.
#[derive(Clone)]
pub struct AssetDescriptor {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    params: Option<Arc<LoaderParams>>,
    on_finished: Option<FinishedCallback>,
}

impl AssetDescriptor {
    /// Create a descriptor for an asset of type `T`.
    pub fn new<T: Asset>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: T::type_name(),
            params: None,
            on_finished: None,
        }
    }

    /// Attach loader parameters.
    pub fn with_params(mut self, params: impl Any + Send + Sync) -> Self {
        self.params = Some(Arc::new(params));
        self
    }

    /// Attach a completion callback.
    pub fn on_finished(
        mut self,
        callback: impl Fn(&AssetManager, &str, TypeId) + Send + Sync + 'static,
    ) -> Self {
        self.on_finished = Some(Arc::new(callback));
        self
    }

    /// The resolved name, unique key for this asset.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The runtime type of the asset.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Human-readable type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The attached loader parameters, if any.
    pub fn params(&self) -> Option<&Arc<LoaderParams>> {
        self.params.as_ref()
    }

    /// Downcast the attached parameters to `P`.
    pub fn params_as<P: Any>(&self) -> Option<&P> {
        self.params.as_deref().and_then(|p| p.downcast_ref::<P>())
    }

    pub(crate) fn callback(&self) -> Option<&FinishedCallback> {
        self.on_finished.as_ref()
    }
}

impl fmt::Debug for AssetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetDescriptor")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("has_params", &self.params.is_some())
            .finish()
    }
}
