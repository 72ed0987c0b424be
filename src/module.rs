//! Modules: named bundles of registrations.
//!
//! A module is the unit a host loads, disables and unloads. Everything it
//! registers goes through the [`Module`] handle, which remembers ownership so
//! [`Module::unload`] can take it all back out of the shared registry.
//!
//! A [`ModuleSource`] is the recipe: a path plus an init function that fills
//! a fresh module. The engine keeps sources around to rebuild the registry on
//! reload.
//!
//! ## Lazy loading
//!
//! Loading every module up front is wasteful when most commands are rarely
//! used. [`Module::lazy_manifest`] captures a module's command names and
//! metadata. [`install_lazy_stubs`] registers a stub per manifest entry that,
//! on first use, runs the real loader and forwards to the command it
//! registered:
//!
//! ```text
//! {cmd}$ ─▶ stub ─▶ loader(registry) ─▶ real `cmd` registered
//!                         │
//!                         └─▶ snapshot().command("cmd") ─▶ real handler
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::engine::{FinderId, SharedRegistry, WatcherId};
use crate::error::{HandlerError, Result};
use crate::{Command, EventMask, Finder, Handler, HandlerResult, Watcher, handler};

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the module that owns a finder or watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// A loaded module bound to a registry.
#[derive(Debug)]
pub struct Module {
    id: ModuleId,
    path: String,
    internal: bool,
    category: Option<String>,
    registry: SharedRegistry,
    commands: BTreeMap<String, Arc<Command>>,
    watchers: Vec<WatcherId>,
    finders: Vec<FinderId>,
}

impl Module {
    pub fn new(path: impl Into<String>, internal: bool, registry: SharedRegistry) -> Self {
        Module {
            id: ModuleId(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed)),
            path: path.into(),
            internal,
            category: None,
            registry,
            commands: BTreeMap::new(),
            watchers: Vec::new(),
            finders: Vec::new(),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Internal modules ship with the host rather than being user-installed.
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Category stamped on commands registered after this call.
    pub fn set_category(&mut self, category: impl Into<String>) {
        self.category = Some(category.into());
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn commands(&self) -> impl Iterator<Item = (&str, &Arc<Command>)> {
        self.commands.iter().map(|(name, command)| (name.as_str(), command))
    }

    pub fn watchers(&self) -> &[WatcherId] {
        &self.watchers
    }

    pub fn finders(&self) -> &[FinderId] {
        &self.finders
    }

    pub fn register_command(&mut self, name: &str, handler: Handler, description: Option<&str>) {
        let command = Arc::new(Command {
            category: self.category.clone(),
            handler,
            description: description.map(str::to_string),
        });
        tracing::debug!(module = %self.path, command = %name, "module registers command");
        self.commands.insert(name.to_string(), Arc::clone(&command));
        self.registry.update(|reg| reg.register(name, command));
    }

    /// Remove `name` if this module registered it and nobody replaced it since.
    pub fn unregister_command(&mut self, name: &str) -> bool {
        let Some(command) = self.commands.remove(name) else {
            return false;
        };
        self.registry.update(|reg| {
            if reg.command(name).is_some_and(|current| Arc::ptr_eq(current, &command)) {
                reg.unregister(name);
            }
        });
        true
    }

    pub fn register_watcher(&mut self, watcher: Watcher, mask: EventMask) -> WatcherId {
        let owner = self.id;
        let id = self.registry.update(|reg| reg.insert_watcher(watcher, mask, Some(owner)));
        self.watchers.push(id);
        id
    }

    pub fn unregister_watcher(&mut self, id: WatcherId) -> bool {
        let before = self.watchers.len();
        self.watchers.retain(|owned| *owned != id);
        before != self.watchers.len() && self.registry.update(|reg| reg.unregister_watcher(id))
    }

    pub fn register_finder(&mut self, finder: Finder) -> FinderId {
        let owner = self.id;
        let id = self.registry.update(|reg| reg.insert_finder(finder, Some(owner)));
        self.finders.push(id);
        id
    }

    pub fn unregister_finder(&mut self, id: FinderId) -> bool {
        let before = self.finders.len();
        self.finders.retain(|owned| *owned != id);
        before != self.finders.len() && self.registry.update(|reg| reg.unregister_finder(id))
    }

    /// Remove everything this module registered, in one registry update.
    pub fn unload(&mut self) {
        let commands = std::mem::take(&mut self.commands);
        let owner = self.id;
        self.registry.update(|reg| {
            for (name, command) in &commands {
                if reg.command(name).is_some_and(|current| Arc::ptr_eq(current, command)) {
                    reg.unregister(name);
                }
            }
            reg.remove_owned(owner);
        });
        self.watchers.clear();
        self.finders.clear();
        tracing::debug!(module = %self.path, "module unloaded");
    }

    /// Describe this module's commands for [`install_lazy_stubs`].
    pub fn lazy_manifest(&self) -> LazyManifest {
        LazyManifest {
            path: self.path.clone(),
            commands: self
                .commands
                .iter()
                .map(|(name, command)| LazyCommand {
                    name: name.clone(),
                    description: command.description.clone(),
                    category: command.category.clone(),
                })
                .collect(),
        }
    }
}

type ModuleInit = Arc<dyn Fn(&mut Module) -> HandlerResult + Send + Sync>;

/// How to build a module: its path and the function that registers its contents.
#[derive(Clone)]
pub struct ModuleSource {
    path: String,
    internal: bool,
    init: ModuleInit,
}

impl ModuleSource {
    pub fn new<F>(path: impl Into<String>, init: F) -> Self
    where
        F: Fn(&mut Module) -> HandlerResult + Send + Sync + 'static,
    {
        ModuleSource { path: path.into(), internal: false, init: Arc::new(init) }
    }

    /// Mark the module as shipped with the host.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Run the init function against `module`.
    pub fn init(&self, module: &mut Module) -> HandlerResult {
        (self.init)(module)
    }

    /// A [`Loader`] that builds this module into whatever registry it is given.
    pub fn loader(&self) -> Loader {
        let source = self.clone();
        Arc::new(move |registry: &SharedRegistry| {
            let mut module = Module::new(source.path(), source.is_internal(), registry.clone());
            source.init(&mut module)
        })
    }
}

impl fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSource")
            .field("path", &self.path)
            .field("internal", &self.internal)
            .field("init", &"<function>")
            .finish()
    }
}

/// Loads the real commands behind a set of lazy stubs.
pub type Loader = Arc<dyn Fn(&SharedRegistry) -> HandlerResult + Send + Sync>;

/// Serializable list of a module's commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyManifest {
    pub path: String,
    #[serde(default)]
    pub commands: Vec<LazyCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyCommand {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl LazyManifest {
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

struct ClearOnDrop<'a>(&'a AtomicBool);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Register a stub for every command in `manifest`.
///
/// The first stub invoked runs `loader`, which is expected to register the
/// real commands under the same names; the stub then forwards the call. A
/// loader that fails is retried on the next invocation. Returns the number of
/// stubs installed.
pub fn install_lazy_stubs(registry: &SharedRegistry, manifest: &LazyManifest, loader: Loader) -> usize {
    let loaded = Arc::new(AtomicBool::new(false));

    registry.update(|reg| {
        for entry in &manifest.commands {
            let name = entry.name.clone();
            let shared = registry.clone();
            let loader = Arc::clone(&loader);
            let loaded = Arc::clone(&loaded);
            let forwarding = Arc::new(AtomicBool::new(false));

            let stub = handler(move |host, query| {
                if forwarding.swap(true, Ordering::AcqRel) {
                    return Err(HandlerError::new(format!("lazy command `{name}` was not provided by its module")));
                }
                let _reset = ClearOnDrop(&forwarding);

                if !loaded.load(Ordering::Acquire) {
                    tracing::debug!(command = %name, "loading lazy command");
                    loader(&shared)?;
                    loaded.store(true, Ordering::Release);
                }

                let command = shared
                    .snapshot()
                    .command(&name)
                    .cloned()
                    .ok_or_else(|| HandlerError::new(format!("lazy command `{name}` disappeared after loading")))?;
                (command.handler)(host, query)
            });

            reg.register(
                entry.name.clone(),
                Command { category: entry.category.clone(), handler: stub, description: entry.description.clone() },
            );
        }
    });

    tracing::debug!(module = %manifest.path, stubs = manifest.commands.len(), "lazy stubs installed");
    manifest.commands.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinderOutcome, Registry, finder, watcher};

    fn noop() -> Handler {
        handler(|_, _| Ok(()))
    }

    #[test]
    fn unload_removes_everything_owned() {
        let registry = SharedRegistry::default();
        registry.update(|reg| reg.register_watcher(watcher(|_, _| Ok(())), EventMask::ALL));

        let mut module = Module::new("greet.rs", false, registry.clone());
        module.set_category("demo");
        module.register_command("hi", noop(), Some("say hi"));
        module.register_watcher(watcher(|_, _| Ok(())), EventMask::TEXT_CHANGED);
        module.register_finder(finder(|_, _, _| Ok(FinderOutcome::unchanged())));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.command("hi").and_then(|c| c.category.as_deref()), Some("demo"));
        assert_eq!(snapshot.watchers().len(), 2);
        assert_eq!(snapshot.finders().len(), 1);

        module.unload();
        let snapshot = registry.snapshot();
        assert!(snapshot.command("hi").is_none());
        assert_eq!(snapshot.watchers().len(), 1);
        assert!(snapshot.finders().is_empty());
    }

    #[test]
    fn unload_keeps_commands_replaced_by_others() {
        let registry = SharedRegistry::default();
        let mut module = Module::new("a.rs", false, registry.clone());
        module.register_command("x", noop(), None);
        registry.update(|reg| reg.register("x", Command::new(noop()).with_description("override")));

        module.unload();
        assert_eq!(registry.snapshot().command("x").and_then(|c| c.description.as_deref()), Some("override"));
    }

    #[test]
    fn unregister_only_touches_own_entries() {
        let registry = SharedRegistry::default();
        let foreign = registry.update(|reg| reg.register_finder(finder(|_, _, _| Ok(FinderOutcome::unchanged()))));
        let mut module = Module::new("a.rs", false, registry.clone());
        assert!(!module.unregister_finder(foreign));
        assert_eq!(registry.snapshot().finders(), vec![foreign]);
        assert!(!module.unregister_command("missing"));
    }

    #[test]
    fn manifest_round_trips_through_toml() {
        let mut module = Module::new("tools.rs", true, SharedRegistry::new(Registry::new()));
        module.set_category("tools");
        module.register_command("upper", noop(), Some("upper-case"));
        module.register_command("lower", noop(), None);

        let manifest = module.lazy_manifest();
        let names: Vec<_> = manifest.commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["lower", "upper"]);

        let text = manifest.to_toml().unwrap();
        assert_eq!(LazyManifest::from_toml(&text).unwrap(), manifest);
    }
}
