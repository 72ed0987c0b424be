//! Command, alias, finder and watcher storage.
//!
//! [`Registry`] is a plain value: cloning it is cheap because every callable
//! is behind an `Arc`. [`SharedRegistry`] publishes registry snapshots through
//! an `ArcSwap`, which gives the engine two properties:
//!
//! - a dispatch pass loads one snapshot and uses it for every occurrence, so
//!   registrations made by a handler are visible from the next event on;
//! - a reload resets the slot and loads every module back into it.
//!
//! ```text
//!   writer: lock ─▶ load ─▶ clone ─▶ mutate ─▶ store ─▶ unlock
//!   reader: load ─▶ Arc<Registry> (stable for the whole pass)
//! ```
//!
//! Writers are serialized by a mutex so concurrent updates never drop each
//! other's changes. Readers never take it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::module::ModuleId;
use crate::{Command, EventKind, EventMask, Finder, Watcher};

static NEXT_CALLABLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_CALLABLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Handle returned by finder registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FinderId(u64);

impl fmt::Display for FinderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle returned by watcher registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone)]
pub(crate) struct FinderEntry {
    pub(crate) id: FinderId,
    pub(crate) owner: Option<ModuleId>,
    pub(crate) finder: Finder,
}

#[derive(Clone)]
pub(crate) struct WatcherEntry {
    pub(crate) id: WatcherId,
    pub(crate) mask: EventMask,
    pub(crate) owner: Option<ModuleId>,
    pub(crate) watcher: Watcher,
}

/// Name-keyed commands plus the alias table, finder chain and watchers.
#[derive(Clone, Default)]
pub struct Registry {
    commands: HashMap<String, Arc<Command>>,
    aliases: HashMap<String, String>,
    finders: Vec<FinderEntry>,
    watchers: Vec<WatcherEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry seeded with an alias table.
    pub fn with_aliases(aliases: HashMap<String, String>) -> Self {
        Registry { aliases, ..Self::default() }
    }

    // --- Commands ------------------------------------------------------------

    /// Register `command` under `name`, returning the entry it replaced.
    pub fn register(&mut self, name: impl Into<String>, command: impl Into<Arc<Command>>) -> Option<Arc<Command>> {
        let name = name.into();
        tracing::debug!(command = %name, "register command");
        self.commands.insert(name, command.into())
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<Command>> {
        tracing::debug!(command = %name, "unregister command");
        self.commands.remove(name)
    }

    pub fn command(&self, name: &str) -> Option<&Arc<Command>> {
        self.commands.get(name)
    }

    /// All commands, sorted by name.
    pub fn commands(&self) -> Vec<(&str, &Arc<Command>)> {
        let mut out: Vec<_> = self.commands.iter().map(|(k, v)| (k.as_str(), v)).collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    // --- Aliases -------------------------------------------------------------

    pub fn set_alias(&mut self, alias: impl Into<String>, name: impl Into<String>) {
        self.aliases.insert(alias.into(), name.into());
    }

    pub fn remove_alias(&mut self, alias: &str) -> Option<String> {
        self.aliases.remove(alias)
    }

    /// The canonical name for `name`; names without an alias resolve to themselves.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }

    // --- Finders -------------------------------------------------------------

    /// Append `finder` to the chain. Finders run in registration order.
    pub fn register_finder(&mut self, finder: Finder) -> FinderId {
        self.insert_finder(finder, None)
    }

    pub(crate) fn insert_finder(&mut self, finder: Finder, owner: Option<ModuleId>) -> FinderId {
        let id = FinderId(next_id());
        tracing::debug!(finder = %id, "register finder");
        self.finders.push(FinderEntry { id, owner, finder });
        id
    }

    pub fn unregister_finder(&mut self, id: FinderId) -> bool {
        let before = self.finders.len();
        self.finders.retain(|entry| entry.id != id);
        self.finders.len() != before
    }

    /// Finder ids in chain order.
    pub fn finders(&self) -> Vec<FinderId> {
        self.finders.iter().map(|entry| entry.id).collect()
    }

    pub(crate) fn finder_chain(&self) -> &[FinderEntry] {
        &self.finders
    }

    // --- Watchers ------------------------------------------------------------

    pub fn register_watcher(&mut self, watcher: Watcher, mask: EventMask) -> WatcherId {
        self.insert_watcher(watcher, mask, None)
    }

    pub(crate) fn insert_watcher(&mut self, watcher: Watcher, mask: EventMask, owner: Option<ModuleId>) -> WatcherId {
        let id = WatcherId(next_id());
        tracing::debug!(watcher = %id, ?mask, "register watcher");
        self.watchers.push(WatcherEntry { id, mask, owner, watcher });
        id
    }

    pub fn unregister_watcher(&mut self, id: WatcherId) -> bool {
        let before = self.watchers.len();
        self.watchers.retain(|entry| entry.id != id);
        self.watchers.len() != before
    }

    /// Watcher ids with their masks, in registration order.
    pub fn watchers(&self) -> Vec<(WatcherId, EventMask)> {
        self.watchers.iter().map(|entry| (entry.id, entry.mask)).collect()
    }

    /// Watchers subscribed to `kind`, in registration order.
    pub(crate) fn watchers_for(&self, kind: EventKind) -> impl Iterator<Item = &WatcherEntry> {
        self.watchers.iter().filter(move |entry| entry.mask.contains(kind.mask()))
    }

    // --- Bulk ----------------------------------------------------------------

    /// Drop every finder and watcher owned by `owner`.
    pub(crate) fn remove_owned(&mut self, owner: ModuleId) {
        self.finders.retain(|entry| entry.owner != Some(owner));
        self.watchers.retain(|entry| entry.owner != Some(owner));
    }

    /// Empty commands, finders and watchers together. Aliases are configuration and stay.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.finders.clear();
        self.watchers.clear();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.commands.keys().collect();
        names.sort();
        f.debug_struct("Registry")
            .field("commands", &names)
            .field("aliases", &self.aliases)
            .field("finders", &self.finders())
            .field("watchers", &self.watchers())
            .finish()
    }
}

/// A [`Registry`] published through atomic snapshot swaps.
///
/// Clones share the same underlying slot. Any thread may call
/// [`update`](Self::update); writers queue on an internal lock while
/// [`snapshot`](Self::snapshot) stays lock-free.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<ArcSwap<Registry>>,
    writer: Arc<Mutex<()>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        SharedRegistry { inner: Arc::new(ArcSwap::from_pointee(registry)), writer: Arc::default() }
    }

    /// The current registry. The snapshot does not change under the caller.
    pub fn snapshot(&self) -> Arc<Registry> {
        self.inner.load_full()
    }

    /// Apply `f` to a copy of the current registry and publish the result.
    ///
    /// `f` must not update this registry itself; the writer lock is held.
    pub fn update<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let _writer = self.writer.lock();
        let mut next = Registry::clone(&self.inner.load());
        let out = f(&mut next);
        self.inner.store(Arc::new(next));
        out
    }

    /// Publish `registry` as the current snapshot.
    pub fn replace(&self, registry: Registry) {
        let _writer = self.writer.lock();
        self.inner.store(Arc::new(registry));
    }
}

impl fmt::Debug for SharedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedRegistry").field(&*self.inner.load()).finish()
    }
}
