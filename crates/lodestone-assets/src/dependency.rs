//! Dependency edges between loaded resources.

use lodestone_core::alloc::{HashMap, HashSet};

/// Tracks, per resource name, the ordered set of dependency names it
/// directly introduced. Edges exist only while the owning resource is
/// loaded; they are removed together with it and are not themselves
/// reference-counted.
#[derive(Default)]
pub struct DependencyTracker {
    edges: HashMap<String, Vec<String>>,
}

impl DependencyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a parent -> child edge, ignoring duplicates.
    pub fn record(&mut self, parent: &str, child: &str) {
        let children = self.edges.entry(parent.to_string()).or_default();
        if !children.iter().any(|c| c == child) {
            children.push(child.to_string());
        }
    }

    /// The direct dependencies recorded for a name.
    pub fn dependencies_of(&self, name: &str) -> Option<&[String]> {
        self.edges.get(name).map(|deps| deps.as_slice())
    }

    /// Drop the edges owned by a name, returning them.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.edges.remove(name)
    }

    /// All names currently referenced as a dependency by some parent.
    pub fn referenced_names(&self) -> HashSet<&str> {
        self.edges
            .values()
            .flat_map(|deps| deps.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_deduplicates() {
        let mut tracker = DependencyTracker::new();
        tracker.record("scene", "tex");
        tracker.record("scene", "tex");
        tracker.record("scene", "mesh");

        assert_eq!(
            tracker.dependencies_of("scene").unwrap(),
            &["tex".to_string(), "mesh".to_string()]
        );
    }

    #[test]
    fn test_remove_drops_edges() {
        let mut tracker = DependencyTracker::new();
        tracker.record("scene", "tex");

        assert_eq!(tracker.remove("scene").unwrap(), vec!["tex".to_string()]);
        assert!(tracker.dependencies_of("scene").is_none());
    }

    #[test]
    fn test_referenced_names() {
        let mut tracker = DependencyTracker::new();
        tracker.record("a", "b");
        tracker.record("c", "b");
        tracker.record("c", "d");

        let referenced = tracker.referenced_names();
        assert!(referenced.contains("b"));
        assert!(referenced.contains("d"));
        assert!(!referenced.contains("a"));
    }
}
