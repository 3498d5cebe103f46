//! Contains the cache configuration.
//!
//! The configuration is read from a YAML file (**config/settings.yml** by default). A loaded
//! document is kept behind an [ArcSwap] so that it can be replaced at any time (e.g. when the
//! file has changed) without blocking readers. Each successful load is broadcast to all
//! [notifiers](Config::notifier), so that components can re-apply their settings - see
//! [Registry::apply_config](crate::registry::Registry::apply_config).
//!
//! # Settings
//!
//! ```yaml
//! groups:
//!     scores:
//!         # Specifies the maximal amount of memory (keys and values) to keep in the cache of
//!         # this group. Supports common suffixes like: k, m, g, t
//!         max_memory: 64m
//! peers:
//!     # Specifies how many virtual nodes are placed on the hash ring per peer.
//!     replicas: 50
//! ```
//!
//! # Examples
//!
//! ```
//! # use peercache::config::Config;
//! let config = Config::new("settings.yml");
//! config.load_from_string("
//! groups:
//!     scores:
//!         max_memory: 2k
//! ", None).unwrap();
//!
//! let settings = config.current();
//! assert_eq!(settings.query("groups.scores.max_memory").as_str(), Some("2k"));
//! assert_eq!(settings.size("groups.scores.max_memory").unwrap(), Some(2048));
//! assert_eq!(settings.size("groups.unknown.max_memory").unwrap(), None);
//! ```
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::fmt::parse_size;

/// Provides access to the cache configuration.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Represents the change listener.
///
/// The message itself carries no information. Once it is received, the config has been
/// replaced and should be re-processed.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a handle to the currently loaded configuration.
///
/// Note that this handle should not be kept around for long, as it will not be updated if the
/// underlying config changes.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

impl Config {
    /// Contains the file being used if none is given explicitly.
    pub const DEFAULT_FILE: &'static str = "config/settings.yml";

    /// Creates a new (empty) config which reads the given file once [load](Config::load) is
    /// invoked.
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Hash(Default::default()), None))),
            tx,
        }
    }

    /// Returns the name of the underlying file.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Obtains a change notifier which receives a message once the config changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Reads the underlying file.
    ///
    /// A missing file is not an error - in this case the current settings (most probably the
    /// empty defaults) are kept.
    pub async fn load(&self) -> anyhow::Result<()> {
        log::info!("Loading config file {}...", &self.filename);

        let metadata = match tokio::fs::metadata(&self.filename).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                log::info!(
                    "Config file {} doesn't exist - using defaults.",
                    &self.filename
                );
                return Ok(());
            }
        };

        let data = tokio::fs::read_to_string(&self.filename)
            .await
            .with_context(|| format!("Cannot load config file {}", &self.filename))?;

        self.load_from_string(&data, metadata.modified().ok())
    }

    /// Loads a configuration from the given string instead of a file.
    ///
    /// If the given data cannot be parsed, an error is returned and the previous configuration
    /// remains active.
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let docs = YamlLoader::load_from_str(data)
            .with_context(|| format!("Cannot parse config file {}", &self.filename))?;

        let doc = match docs.into_iter().next() {
            Some(doc @ Yaml::Hash(_)) => doc,
            _ => Yaml::Hash(Default::default()),
        };

        self.config.store(Arc::new((doc, last_modified)));

        // Notify all listeners - we ignore if there are none...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Returns the root of the loaded document.
    pub fn root(&self) -> &Yaml {
        &self.config.0
    }

    /// Returns the last modified date of the file this config was read from.
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.config.1
    }

    /// Resolves a dotted path like `groups.scores.max_memory`.
    ///
    /// Returns **Yaml::BadValue** if any part of the path is missing.
    pub fn query(&self, path: &str) -> &Yaml {
        path.split('.').fold(self.root(), |node, key| &node[key])
    }

    /// Reads a byte size from the given path.
    ///
    /// Plain integers are treated as bytes, strings are parsed via
    /// [parse_size](crate::fmt::parse_size). Returns **None** if no value is present.
    pub fn size(&self, path: &str) -> anyhow::Result<Option<usize>> {
        match self.query(path) {
            Yaml::BadValue | Yaml::Null => Ok(None),
            Yaml::Integer(value) if *value >= 0 => Ok(Some(*value as usize)),
            Yaml::String(value) => parse_size(value)
                .map(Some)
                .with_context(|| format!("Invalid size for '{}'", path)),
            other => Err(anyhow::anyhow!(
                "Expected a size for '{}' but found: {:?}",
                path,
                other
            )),
        }
    }
}
