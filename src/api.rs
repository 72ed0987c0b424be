use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::engine::{
    DispatchReport, Dispatcher, MenuItem, MenuOutcome, MenuTracker, Query, Registry, Scheduler, SharedRegistry,
    TriggerPattern, notify_watchers, report_failure,
};
use crate::error::{FailureSource, LogReporter, Reporter, Result, isolate};
use crate::module::{Module, ModuleSource};
use crate::surface::{Surface, SurfaceId, Surfaces};
use crate::{EventKind, Handler};

/// What a handler can reach while it runs.
///
/// A host is built by the engine for each callable invocation and borrows the
/// engine's parts for that duration only.
pub struct Host<'a> {
    surface: &'a mut dyn Surface,
    registry: &'a SharedRegistry,
    menus: &'a mut MenuTracker,
    scheduler: &'a Scheduler,
    settings: &'a Settings,
}

impl<'a> Host<'a> {
    pub(crate) fn new(
        surface: &'a mut dyn Surface,
        registry: &'a SharedRegistry,
        menus: &'a mut MenuTracker,
        scheduler: &'a Scheduler,
        settings: &'a Settings,
    ) -> Self {
        Host { surface, registry, menus, scheduler, settings }
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface.id()
    }

    /// The surface the current event came from.
    pub fn surface(&mut self) -> &mut dyn Surface {
        &mut *self.surface
    }

    /// The live registry. Changes are visible from the next event.
    pub fn registry(&self) -> &SharedRegistry {
        self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.scheduler
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn menus(&mut self) -> &mut MenuTracker {
        &mut *self.menus
    }

    /// [`Query::answer`] on this host's surface.
    pub fn answer(&mut self, query: &mut Query, reply: Option<&str>) -> bool {
        query.answer(&mut *self.surface, reply)
    }

    /// Answer through the clipboard when pasted answers are enabled, else
    /// answer directly.
    pub fn answer_pasted(&mut self, query: &mut Query, reply: Option<&str>) -> bool {
        if self.settings.pasted_answers {
            query.answer_pasted(&mut *self.surface, reply, self.settings.paste_attempts)
        } else {
            query.answer(&mut *self.surface, reply)
        }
    }

    /// Render a menu in place of the query's expression. See [`MenuTracker::create`].
    pub fn create_menu(&mut self, query: &mut Query, items: Vec<MenuItem>, cancel: Option<Handler>) -> bool {
        self.menus.create(&mut *self.surface, query, items, cancel)
    }
}

/// The dispatch engine.
///
/// Owns everything that used to be process-global: settings, the command
/// registry, the dedupe guard, menu contexts, the task queue and the loaded
/// modules. Drive it from a single event thread.
///
/// # Example
/// ```
/// use inkline::{Command, Engine, EventKind, MemorySurface, Settings, handler};
///
/// let mut engine = Engine::new(Settings::default()).unwrap();
/// engine.registry().update(|reg| {
///     reg.register("shout", Command::new(handler(|host, query| {
///         let reply = query.args().to_uppercase();
///         host.answer(query, Some(&reply));
///         Ok(())
///     })))
/// });
///
/// let mut surface = MemorySurface::new(1, "{shout hello}$");
/// engine.handle_event(&mut surface, EventKind::TextChanged);
/// assert_eq!(surface.text(), "HELLO");
/// ```
pub struct Engine {
    settings: Settings,
    registry: SharedRegistry,
    dispatcher: Dispatcher,
    menus: MenuTracker,
    scheduler: Scheduler,
    reporter: Arc<dyn Reporter>,
    modules: Vec<Module>,
    sources: Vec<ModuleSource>,
}

impl Engine {
    /// Build an engine that reports failures through `tracing`.
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_reporter(settings, Arc::new(LogReporter))
    }

    pub fn with_reporter(settings: Settings, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let pattern = settings.trigger_pattern()?;
        let registry = SharedRegistry::new(Registry::with_aliases(settings.aliases.clone()));
        Ok(Engine {
            dispatcher: Dispatcher::new(pattern),
            menus: MenuTracker::new(settings.receive_selection_changes),
            registry,
            scheduler: Scheduler::new(),
            reporter,
            modules: Vec::new(),
            sources: Vec::new(),
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Clone this to post work from other threads.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn menus(&self) -> &MenuTracker {
        &self.menus
    }

    pub fn pattern(&self) -> &TriggerPattern {
        self.dispatcher.pattern()
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Process one notification from `surface`.
    ///
    /// Text changes return the pass report, or `None` when the text is
    /// identical to what the last pass left behind. Absent text reads as
    /// `""`. Selection changes always return `None`.
    pub fn handle_event(&mut self, surface: &mut dyn Surface, kind: EventKind) -> Option<DispatchReport> {
        match kind {
            EventKind::TextChanged => self.text_changed(surface),
            EventKind::SelectionChanged => {
                self.selection_changed(surface);
                None
            }
        }
    }

    fn text_changed(&mut self, surface: &mut dyn Surface) -> Option<DispatchReport> {
        let id = surface.id();
        let text = surface.read_text().unwrap_or_default();
        if !self.dispatcher.should_process(id, &text) {
            tracing::trace!(surface = %id, "text unchanged since last pass");
            return None;
        }

        let Engine { settings, registry, dispatcher, menus, scheduler, reporter, .. } = self;
        let snapshot = registry.snapshot();
        let mut host = Host::new(surface, registry, menus, scheduler, settings);
        Some(dispatcher.run_pass(&mut host, &snapshot, text, &**reporter))
    }

    fn selection_changed(&mut self, surface: &mut dyn Surface) {
        let Engine { settings, registry, menus, scheduler, reporter, .. } = self;
        let snapshot = registry.snapshot();
        let mut failures = Vec::new();

        {
            let mut host = Host::new(&mut *surface, registry, &mut *menus, scheduler, settings);
            notify_watchers(&mut host, &snapshot, EventKind::SelectionChanged, &**reporter, &mut failures);
        }

        let Some(outcome) = menus.on_selection_changed(&*surface) else {
            return;
        };
        let mut host = Host::new(surface, registry, menus, scheduler, settings);
        match outcome {
            MenuOutcome::Cancelled { mut query, cancel: Some(cancel) } => {
                if let Err(message) = isolate(|| cancel(&mut host, &mut query)) {
                    report_failure(&**reporter, &mut failures, FailureSource::MenuCancel, message);
                }
            }
            MenuOutcome::Cancelled { mut query, cancel: None } => {
                host.answer(&mut query, None);
            }
            MenuOutcome::Selected { mut query, action } => {
                if let Err(message) = isolate(|| action(&mut host, &mut query)) {
                    report_failure(&**reporter, &mut failures, FailureSource::MenuAction, message);
                }
            }
        }
    }

    /// Run every task already due. Returns how many ran.
    pub fn run_pending(&mut self, surfaces: &mut dyn Surfaces) -> usize {
        self.run_due(surfaces, Instant::now())
    }

    /// Run the tasks due at `now`; tasks whose surface is gone are dropped.
    pub fn run_due(&mut self, surfaces: &mut dyn Surfaces, now: Instant) -> usize {
        let Engine { settings, registry, menus, scheduler, reporter, .. } = self;
        let mut failures = Vec::new();
        let mut ran = 0;

        for scheduled in scheduler.take_due(now) {
            let Some(surface) = surfaces.surface_mut(scheduled.surface) else {
                tracing::debug!(surface = %scheduled.surface, "surface gone, task dropped");
                continue;
            };
            let task = scheduled.task;
            let mut host = Host::new(surface, registry, menus, scheduler, settings);
            if let Err(message) = isolate(|| task(&mut host)) {
                report_failure(&**reporter, &mut failures, FailureSource::Task, message);
            }
            ran += 1;
        }
        ran
    }

    /// Forget everything tied to `surface`: its dedupe text and its menu.
    pub fn release_surface(&mut self, surface: SurfaceId) {
        self.dispatcher.forget(surface);
        self.menus.close(surface);
    }

    // --- Modules -------------------------------------------------------------

    /// Load `source` now and keep it for later reloads.
    ///
    /// Returns whether the module is loaded; sources listed in
    /// `Settings::unloaded` are kept but not loaded.
    pub fn add_module(&mut self, source: ModuleSource) -> bool {
        let registry = self.registry.clone();
        let loaded = self.load(&source, &registry);
        self.sources.push(source);
        loaded
    }

    /// Unload the module at `path` and drop its source.
    pub fn unload_module(&mut self, path: &str) -> bool {
        self.sources.retain(|source| source.path() != path);
        let Some(index) = self.modules.iter().position(|module| module.path() == path) else {
            return false;
        };
        self.modules.remove(index).unload();
        true
    }

    fn load(&mut self, source: &ModuleSource, registry: &SharedRegistry) -> bool {
        if self.settings.unloaded.contains(source.path()) {
            tracing::debug!(module = %source.path(), "module disabled in settings");
            return false;
        }

        let mut module = Module::new(source.path(), source.is_internal(), registry.clone());
        match isolate(|| source.init(&mut module)) {
            Ok(()) => {
                tracing::debug!(module = %source.path(), commands = module.commands().count(), "module loaded");
                self.modules.push(module);
                true
            }
            Err(message) => {
                module.unload();
                let origin = FailureSource::Module(source.path().to_string());
                report_failure(&*self.reporter, &mut Vec::new(), origin, message);
                false
            }
        }
    }

    /// Rebuild the registry from the module sources.
    ///
    /// The live registry is reset to the configured aliases and every source
    /// is loaded back into it, so handles a module cloned from
    /// [`Module::registry`] keep pointing at the registry the engine
    /// dispatches from. Pending tasks are cancelled, menus closed and the
    /// dedupe guard reset.
    pub fn reload(&mut self) {
        self.scheduler.cancel_all();
        self.menus.clear();
        self.dispatcher.clear();
        self.modules.clear();

        self.registry.replace(Registry::with_aliases(self.settings.aliases.clone()));
        let registry = self.registry.clone();
        let sources = std::mem::take(&mut self.sources);
        for source in &sources {
            self.load(source, &registry);
        }
        self.sources = sources;
        tracing::debug!(modules = self.modules.len(), "registry reloaded");
    }

    /// Apply new settings, then [`reload`](Self::reload).
    pub fn reload_with(&mut self, settings: Settings) -> Result<()> {
        let pattern = settings.trigger_pattern()?;
        self.dispatcher = Dispatcher::new(pattern);
        self.menus.set_receive_selection_changes(settings.receive_selection_changes);
        self.settings = settings;
        self.reload();
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("menus", &self.menus)
            .field("scheduler", &self.scheduler)
            .field("modules", &self.modules.iter().map(Module::path).collect::<Vec<_>>())
            .finish()
    }
}
