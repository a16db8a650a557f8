//! Asset management for the Lodestone engine.
//!
//! [`AssetManager`] loads named resources through pluggable loaders, tracks
//! the dependency graph between them, and reference-counts shared resources
//! so a resource is disposed exactly once, when its last owner releases it.
//!
//! Loading is cooperative: the owning thread repeatedly calls
//! [`AssetManager::update`], which advances at most one in-flight load per
//! call. Loaders come in two shapes: synchronous loaders run entirely on the
//! owner thread, asynchronous loaders run their heavy phase on a small
//! background worker pool and are polled for completion on later `update`
//! calls.
//!
//! # Example
//!
//! ```ignore
//! let manager = AssetManager::new("assets");
//! manager.register_loader::<Texture>("", Loader::sync(TextureLoader))?;
//!
//! manager.load::<Texture>("sprites/player.png")?;
//! manager.finish_loading()?;
//!
//! let texture = manager.get_required::<Texture>("sprites/player.png")?;
//! ```

pub mod catalog;
pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod resolver;
pub mod task;
pub mod worker;

pub use catalog::ResourcePayload;
pub use descriptor::{AssetDescriptor, FinishedCallback, LoaderParams};
pub use error::{AssetError, AssetResult};
pub use loader::{AsyncAssetLoader, LoadContext, SyncAssetLoader};
pub use manager::{AssetManager, ErrorListener};
pub use registry::Loader;
pub use resolver::{FileResolver, FsResolver, MemoryResolver, ResolvedFile};

/// Marker trait for types that can be managed as assets.
///
/// `dispose` is invoked exactly once, when the manager drops the last
/// reference to the asset. The default implementation does nothing; assets
/// owning external resources (GPU buffers, audio voices) override it.
pub trait Asset: Send + Sync + 'static {
    /// Human-readable type name used in errors and logs.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Release any external resources held by this asset.
    fn dispose(&self) {}
}

impl Asset for String {}
impl Asset for Vec<u8> {}
