//! Keyed storage of loaded resources with reference counting.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use lodestone_core::alloc::HashMap;

use crate::Asset;
use crate::error::{AssetError, AssetResult};

/// A type-erased loaded resource plus the disposer captured at wrap time.
///
/// The disposer is a monomorphized fn pointer chosen when the concrete type
/// is still known, so disposal never inspects the payload's dynamic type.
#[derive(Clone)]
pub struct ResourcePayload {
    value: Arc<dyn Any + Send + Sync>,
    disposer: fn(&(dyn Any + Send + Sync)),
}

fn dispose_erased<T: Asset>(value: &(dyn Any + Send + Sync)) {
    if let Some(value) = value.downcast_ref::<T>() {
        value.dispose();
    }
}

impl ResourcePayload {
    /// Wrap a concrete asset value.
    pub fn new<T: Asset>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            disposer: dispose_erased::<T>,
        }
    }

    /// Downcast to the concrete asset type.
    pub fn downcast<T: Asset>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    fn dispose(&self) {
        (self.disposer)(&*self.value);
    }
}

impl fmt::Debug for ResourcePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePayload").finish_non_exhaustive()
    }
}

struct CatalogEntry {
    payload: ResourcePayload,
    refs: u32,
}

/// Keyed storage of loaded resources by (type, name).
///
/// Entries are created with a reference count of 1 and removed, with their
/// payload disposed, in the same step the count reaches 0. The name-to-type
/// table is kept in lockstep so a name maps to exactly one runtime type.
#[derive(Default)]
pub struct Catalog {
    by_type: HashMap<TypeId, HashMap<String, CatalogEntry>>,
    type_of: HashMap<String, (TypeId, &'static str)>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a resource under (type, name) with the given initial count.
    ///
    /// Replaces any existing handle for the name without disposing it; the
    /// scheduler only calls this for names it has verified.
    pub fn add(
        &mut self,
        name: &str,
        type_id: TypeId,
        type_name: &'static str,
        payload: ResourcePayload,
        refs: u32,
    ) {
        self.type_of.insert(name.to_string(), (type_id, type_name));
        self.by_type
            .entry(type_id)
            .or_default()
            .insert(name.to_string(), CatalogEntry { payload, refs });
    }

    /// Get a resource by name, downcast to `T`.
    pub fn get<T: Asset>(&self, name: &str) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entries| entries.get(name))
            .and_then(|entry| entry.payload.downcast::<T>())
    }

    /// All loaded resources of type `T`.
    pub fn get_all<T: Asset>(&self) -> Vec<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|entries| {
                entries
                    .values()
                    .filter_map(|entry| entry.payload.downcast::<T>())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a name is loaded, under any type.
    pub fn contains(&self, name: &str) -> bool {
        self.type_of.contains_key(name)
    }

    /// Whether a name is loaded under the given type.
    pub fn contains_typed(&self, name: &str, type_id: TypeId) -> bool {
        self.type_of
            .get(name)
            .is_some_and(|(id, _)| *id == type_id)
    }

    /// The (type id, type name) recorded for a loaded name.
    pub fn type_of(&self, name: &str) -> Option<(TypeId, &'static str)> {
        self.type_of.get(name).copied()
    }

    /// The current reference count for a name.
    pub fn ref_count(&self, name: &str) -> Option<u32> {
        let (type_id, _) = self.type_of.get(name)?;
        self.by_type
            .get(type_id)
            .and_then(|entries| entries.get(name))
            .map(|entry| entry.refs)
    }

    /// Overwrite the reference count for a name.
    ///
    /// Setting 0 disposes and removes the entry, the same as the count
    /// reaching 0 through [`Catalog::release`]; an entry never sits in the
    /// catalog with a count of zero.
    pub fn set_ref_count(&mut self, name: &str, refs: u32) -> AssetResult<()> {
        let entry = self.entry_mut(name).ok_or_else(|| AssetError::NotLoaded {
            name: name.to_string(),
        })?;
        if refs == 0 {
            entry.refs = 1;
            self.release(name)?;
            return Ok(());
        }
        entry.refs = refs;
        Ok(())
    }

    /// Increment the reference count for a name. Returns false if absent.
    pub fn add_ref(&mut self, name: &str) -> bool {
        match self.entry_mut(name) {
            Some(entry) => {
                entry.refs = entry.refs.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Decrement the reference count for a name.
    ///
    /// When the count reaches 0 the payload is disposed and the entry is
    /// removed in the same step; returns `true` in that case. Fails with
    /// [`AssetError::NotLoaded`] if the name is absent.
    pub fn release(&mut self, name: &str) -> AssetResult<bool> {
        let Some(&(type_id, _)) = self.type_of.get(name) else {
            return Err(AssetError::NotLoaded {
                name: name.to_string(),
            });
        };

        let entries = self
            .by_type
            .get_mut(&type_id)
            .expect("type table out of sync with catalog");
        let entry = entries
            .get_mut(name)
            .expect("type table out of sync with catalog");

        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return Ok(false);
        }

        let entry = entries.remove(name).expect("entry vanished during release");
        if entries.is_empty() {
            self.by_type.remove(&type_id);
        }
        self.type_of.remove(name);
        entry.payload.dispose();
        Ok(true)
    }

    /// Snapshot of all loaded names.
    pub fn names(&self) -> Vec<String> {
        self.type_of.keys().cloned().collect()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.type_of.is_empty()
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut CatalogEntry> {
        let (type_id, _) = self.type_of.get(name)?;
        self.by_type
            .get_mut(type_id)
            .and_then(|entries| entries.get_mut(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Tracked(Arc<AtomicU32>);

    impl Asset for Tracked {
        fn dispose(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn add_string(catalog: &mut Catalog, name: &str, value: &str) {
        catalog.add(
            name,
            TypeId::of::<String>(),
            String::type_name(),
            ResourcePayload::new(value.to_string()),
            1,
        );
    }

    #[test]
    fn test_add_and_get() {
        let mut catalog = Catalog::new();
        add_string(&mut catalog, "greeting.txt", "hello");

        assert!(catalog.contains("greeting.txt"));
        assert!(catalog.contains_typed("greeting.txt", TypeId::of::<String>()));
        assert!(!catalog.contains_typed("greeting.txt", TypeId::of::<Vec<u8>>()));
        assert_eq!(*catalog.get::<String>("greeting.txt").unwrap(), "hello");
        assert!(catalog.get::<Vec<u8>>("greeting.txt").is_none());
    }

    #[test]
    fn test_ref_counting_and_removal() {
        let mut catalog = Catalog::new();
        add_string(&mut catalog, "a.txt", "a");

        assert_eq!(catalog.ref_count("a.txt"), Some(1));
        assert!(catalog.add_ref("a.txt"));
        assert_eq!(catalog.ref_count("a.txt"), Some(2));

        assert!(!catalog.release("a.txt").unwrap());
        assert!(catalog.release("a.txt").unwrap());
        assert!(!catalog.contains("a.txt"));
        assert!(catalog.is_empty());

        assert!(matches!(
            catalog.release("a.txt"),
            Err(AssetError::NotLoaded { .. })
        ));
    }

    #[test]
    fn test_dispose_runs_once_at_zero() {
        let disposed = Arc::new(AtomicU32::new(0));
        let mut catalog = Catalog::new();
        catalog.add(
            "tracked",
            TypeId::of::<Tracked>(),
            Tracked::type_name(),
            ResourcePayload::new(Tracked(disposed.clone())),
            2,
        );

        assert!(!catalog.release("tracked").unwrap());
        assert_eq!(disposed.load(Ordering::SeqCst), 0);

        assert!(catalog.release("tracked").unwrap());
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_ref_count_zero_disposes_and_removes() {
        let disposed = Arc::new(AtomicU32::new(0));
        let mut catalog = Catalog::new();
        catalog.add(
            "tracked",
            TypeId::of::<Tracked>(),
            Tracked::type_name(),
            ResourcePayload::new(Tracked(disposed.clone())),
            5,
        );

        catalog.set_ref_count("tracked", 0).unwrap();
        assert!(!catalog.contains("tracked"));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_all_by_type() {
        let mut catalog = Catalog::new();
        add_string(&mut catalog, "a.txt", "a");
        add_string(&mut catalog, "b.txt", "b");

        let mut values: Vec<String> = catalog
            .get_all::<String>()
            .into_iter()
            .map(|s| (*s).clone())
            .collect();
        values.sort();
        assert_eq!(values, vec!["a", "b"]);
        assert!(catalog.get_all::<Vec<u8>>().is_empty());
    }
}
