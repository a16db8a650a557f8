//! Loader registry keyed by asset type and filename suffix.

use std::any::TypeId;
use std::sync::Arc;

use lodestone_core::alloc::HashMap;

use crate::descriptor::{AssetDescriptor, LoaderParams};
use crate::error::{AssetError, AssetResult};
use crate::loader::{AsyncAssetLoader, SyncAssetLoader};
use crate::resolver::ResolvedFile;

/// A registered loader capability, tagged by protocol shape.
#[derive(Clone)]
pub enum Loader {
    /// Loads entirely on the owner thread.
    Sync(Arc<dyn SyncAssetLoader>),
    /// Splits work into a worker phase and an owner-thread finish.
    Async(Arc<dyn AsyncAssetLoader>),
}

impl Loader {
    /// Wrap a synchronous loader.
    pub fn sync(loader: impl SyncAssetLoader) -> Self {
        Loader::Sync(Arc::new(loader))
    }

    /// Wrap an asynchronous loader.
    pub fn asynchronous(loader: impl AsyncAssetLoader) -> Self {
        Loader::Async(Arc::new(loader))
    }

    pub(crate) fn dependencies(
        &self,
        name: &str,
        file: &ResolvedFile,
        params: Option<&Arc<LoaderParams>>,
    ) -> Option<Vec<AssetDescriptor>> {
        match self {
            Loader::Sync(loader) => loader.dependencies(name, file, params),
            Loader::Async(loader) => loader.dependencies(name, file, params),
        }
    }
}

struct TypeLoaders {
    type_name: &'static str,
    by_suffix: HashMap<String, Loader>,
}

/// Loaders per (asset type, filename suffix), with longest-suffix-match
/// selection. The empty suffix registers the default loader for a type.
#[derive(Default)]
pub struct LoaderRegistry {
    by_type: HashMap<TypeId, TypeLoaders>,
}

impl LoaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader for a (type, suffix) pair.
    ///
    /// Fails with [`AssetError::LoaderConflict`] if the exact pair is
    /// already taken; existing registrations are never silently replaced.
    pub fn register(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        suffix: impl Into<String>,
        loader: Loader,
    ) -> AssetResult<()> {
        let suffix = suffix.into();
        let entry = self.by_type.entry(type_id).or_insert_with(|| TypeLoaders {
            type_name,
            by_suffix: HashMap::new(),
        });

        if entry.by_suffix.contains_key(&suffix) {
            return Err(AssetError::LoaderConflict {
                type_name: entry.type_name,
                suffix,
            });
        }
        tracing::debug!(type_name, suffix = %suffix, "registered loader");
        entry.by_suffix.insert(suffix, loader);
        Ok(())
    }

    /// Find the loader for a type, matched against a filename.
    ///
    /// With no filename, returns the default (empty-suffix) registration.
    /// Otherwise the loader with the longest suffix the filename ends with
    /// wins; the empty suffix matches every filename as a last resort.
    pub fn resolve(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        filename: Option<&str>,
    ) -> AssetResult<Loader> {
        let no_loader = || AssetError::NoLoader {
            type_name,
            name: filename.map(str::to_string),
        };
        let entry = self.by_type.get(&type_id).ok_or_else(no_loader)?;

        let Some(filename) = filename else {
            return entry.by_suffix.get("").cloned().ok_or_else(no_loader);
        };

        let mut best: Option<(&str, &Loader)> = None;
        for (suffix, loader) in &entry.by_suffix {
            if !filename.ends_with(suffix.as_str()) {
                continue;
            }
            if best.is_none_or(|(best_suffix, _)| suffix.len() > best_suffix.len()) {
                best = Some((suffix, loader));
            }
        }
        best.map(|(_, loader)| loader.clone()).ok_or_else(no_loader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Asset;
    use crate::catalog::ResourcePayload;
    use crate::loader::LoadContext;

    struct Marker(&'static str);

    struct MarkerLoader(&'static str);

    impl SyncAssetLoader for MarkerLoader {
        fn load(&self, _ctx: &LoadContext<'_>) -> AssetResult<ResourcePayload> {
            Ok(ResourcePayload::new(self.0.to_string()))
        }
    }

    impl Asset for Marker {}

    fn registry_with(suffixes: &[&'static str]) -> LoaderRegistry {
        let mut registry = LoaderRegistry::new();
        for suffix in suffixes {
            registry
                .register(
                    TypeId::of::<Marker>(),
                    Marker::type_name(),
                    *suffix,
                    Loader::sync(MarkerLoader(suffix)),
                )
                .unwrap();
        }
        registry
    }

    // The marker loaders ignore their context and just report which suffix
    // entry was selected.
    fn resolved_suffix(registry: &LoaderRegistry, filename: Option<&str>) -> String {
        let Loader::Sync(loader) = registry
            .resolve(TypeId::of::<Marker>(), Marker::type_name(), filename)
            .unwrap()
        else {
            panic!("expected sync loader");
        };
        let catalog = crate::catalog::Catalog::new();
        let descriptor = AssetDescriptor::new::<Marker>("x");
        let file = ResolvedFile::memory("x", Vec::new());
        let ctx = LoadContext {
            catalog: &catalog,
            descriptor: &descriptor,
            file: &file,
        };
        let payload = loader.load(&ctx).unwrap();
        (*payload.downcast::<String>().unwrap()).clone()
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry_with(&[""]);
        let err = registry
            .register(
                TypeId::of::<Marker>(),
                Marker::type_name(),
                "",
                Loader::sync(MarkerLoader("")),
            )
            .unwrap_err();
        assert!(matches!(err, AssetError::LoaderConflict { .. }));
    }

    #[test]
    fn test_longest_suffix_wins() {
        let registry = registry_with(&["", ".png", ".etc2.png"]);

        assert_eq!(
            resolved_suffix(&registry, Some("tiles.etc2.png")),
            ".etc2.png"
        );
        assert_eq!(resolved_suffix(&registry, Some("player.png")), ".png");
        assert_eq!(resolved_suffix(&registry, Some("data.bin")), "");
    }

    #[test]
    fn test_default_loader_without_filename() {
        let registry = registry_with(&["", ".png"]);
        assert_eq!(resolved_suffix(&registry, None), "");
    }

    #[test]
    fn test_no_loader_errors() {
        let registry = registry_with(&[".png"]);

        // Unmatched suffix for a registered type.
        assert!(matches!(
            registry.resolve(TypeId::of::<Marker>(), Marker::type_name(), Some("a.bin")),
            Err(AssetError::NoLoader { .. })
        ));
        // Never-registered type.
        assert!(matches!(
            registry.resolve(TypeId::of::<String>(), String::type_name(), Some("a.png")),
            Err(AssetError::NoLoader { .. })
        ));
        // Registered type, but no default entry.
        assert!(matches!(
            registry.resolve(TypeId::of::<Marker>(), Marker::type_name(), None),
            Err(AssetError::NoLoader { .. })
        ));
    }
}
