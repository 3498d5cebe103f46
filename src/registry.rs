//! Provides a registry which keeps all groups of a process in a single place.
//!
//! Nodes serving remote lookups need to resolve a group by its name. Instead of keeping a hidden
//! global table, a [Registry] is created once during startup and handed to whatever needs to
//! perform such lookups (e.g. the transport which serves peer requests).
//!
//! Registration takes a write lock, lookups only a read lock, therefore any number of lookups
//! can be performed concurrently.
//!
//! Note that in common cases [Registry::require] is a good way of fetching a group which is
//! known to be there as it was set up during startup. If the name is provided from the outside
//! (e.g. by a remote peer), [Registry::find] should be used and the **None** case be handled
//! gracefully.
//!
//! # Examples
//!
//! ```
//! # use peercache::group::loader_fn;
//! # use peercache::registry::Registry;
//! let registry = Registry::new();
//!
//! // Creates and registers a new group...
//! let _ = registry.new_group("scores", 1024, loader_fn(|_| Ok(b"42".to_vec())));
//!
//! // Obtains a reference to a previously registered group...
//! assert_eq!(registry.require("scores").name(), "scores");
//!
//! // Trying to obtain a group which hasn't been registered yet, returns an empty optional...
//! assert_eq!(registry.find("unknown").is_none(), true);
//! ```
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::group::{Group, Loader};

/// Keeps all groups by their name.
#[derive(Default)]
pub struct Registry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Registry {
    /// Creates a new and empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Registry::default())
    }

    /// Registers the given group under its name.
    ///
    /// # Panics
    /// Panics if a group with the same name is already present. Setting up groups happens
    /// once during startup, therefore a duplicate name is a wiring error.
    pub fn register(&self, group: Arc<Group>) {
        let mut groups = self.groups.write().unwrap();
        if groups.contains_key(group.name()) {
            panic!("A group named {} has already been registered!", group.name());
        }

        log::info!(
            "Registered group {} (max memory: {}).",
            group.name(),
            crate::fmt::format_size(group.max_memory())
        );
        let _ = groups.insert(group.name().to_owned(), group);
    }

    /// Creates a new group and registers it.
    ///
    /// This is a shortcut for [Group::new] and [Registry::register]. Use a
    /// [GroupBuilder](crate::builder::GroupBuilder) if peers or a config are to be applied.
    pub fn new_group(
        &self,
        name: impl Into<String>,
        max_memory: usize,
        loader: Arc<dyn Loader>,
    ) -> Arc<Group> {
        let group = Arc::new(Group::new(name, max_memory, loader));
        self.register(group.clone());

        group
    }

    /// Tries to resolve a previously registered group.
    pub fn find(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().unwrap().get(name).cloned()
    }

    /// Resolves a previously registered group.
    ///
    /// # Panics
    /// Panics if no group with the given name is known.
    ///
    /// ```should_panic
    /// # use peercache::registry::Registry;
    /// let registry = Registry::new();
    ///
    /// // This will panic...
    /// let _ = registry.require("unknown");
    /// ```
    pub fn require(&self, name: &str) -> Arc<Group> {
        match self.find(name) {
            Some(group) => group,
            None => panic!(
                "A required group ({}) was not available in the registry!",
                name
            ),
        }
    }

    /// Returns the names of all registered groups in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().unwrap().keys().cloned().collect();
        names.sort();

        names
    }

    /// Re-applies **groups.<name>.max_memory** of the given config to all registered groups.
    ///
    /// Groups without a setting keep their current budget. Invalid settings are logged and
    /// skipped.
    pub fn apply_config(&self, config: &Config) {
        let settings = config.current();
        let groups: Vec<Arc<Group>> = self.groups.read().unwrap().values().cloned().collect();

        for group in groups {
            match settings.size(&format!("groups.{}.max_memory", group.name())) {
                Ok(Some(max_memory)) if max_memory != group.max_memory() => {
                    log::info!(
                        "Changing max memory of group {} to {}.",
                        group.name(),
                        crate::fmt::format_size(max_memory)
                    );
                    group.set_max_memory(max_memory);
                }
                Ok(_) => (),
                Err(error) => log::error!(
                    "Not applying the config to group {}: {:#}",
                    group.name(),
                    error
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::group::{loader_fn, Group};
    use crate::registry::Registry;
    use std::sync::Arc;

    #[test]
    fn groups_can_be_found_by_name() {
        let registry = Registry::new();
        let scores = registry.new_group("scores", 0, loader_fn(|_| Ok(Vec::new())));
        registry.register(Arc::new(Group::new(
            "names",
            0,
            loader_fn(|_| Ok(Vec::new())),
        )));

        assert_eq!(Arc::ptr_eq(&registry.require("scores"), &scores), true);
        assert_eq!(registry.find("names").is_some(), true);
        assert_eq!(registry.find("unknown").is_none(), true);
        assert_eq!(registry.names(), vec!["names".to_owned(), "scores".to_owned()]);
    }

    #[test]
    #[should_panic]
    fn duplicate_names_are_rejected() {
        let registry = Registry::new();
        let _ = registry.new_group("scores", 0, loader_fn(|_| Ok(Vec::new())));
        let _ = registry.new_group("scores", 0, loader_fn(|_| Ok(Vec::new())));
    }

    #[test]
    fn registered_groups_are_visible_across_tasks() {
        crate::testing::test_async(async {
            let registry = Registry::new();
            let _ = registry.new_group("scores", 0, loader_fn(|key| Ok(key.as_bytes().to_vec())));

            let background = registry.clone();
            let value = tokio::spawn(async move {
                background.require("scores").get("Tom").await.unwrap()
            })
            .await
            .unwrap();

            assert_eq!(value.to_string(), "Tom");
            assert_eq!(registry.require("scores").is_cached("Tom"), true);
        });
    }

    #[test]
    fn config_changes_are_applied() {
        let registry = Registry::new();
        let scores = registry.new_group("scores", 0, loader_fn(|_| Ok(Vec::new())));
        let names = registry.new_group("names", 512, loader_fn(|_| Ok(Vec::new())));
        let broken = registry.new_group("broken", 256, loader_fn(|_| Ok(Vec::new())));

        let config = Config::new("test.yml");
        config
            .load_from_string(
                "
groups:
    scores:
        max_memory: 1k
    broken:
        max_memory: lots
",
                None,
            )
            .unwrap();
        registry.apply_config(&config);

        assert_eq!(scores.max_memory(), 1024);
        assert_eq!(names.max_memory(), 512);
        assert_eq!(broken.max_memory(), 256);
    }
}
