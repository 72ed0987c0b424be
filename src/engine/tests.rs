use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use crate::{
    CollectingReporter, Command, Engine, Error, EventKind, EventMask, FailureSource, FinderOutcome, Handler,
    HandlerResult, LazyCommand, LazyManifest, MemorySurface, MenuItem, ModuleSource, Outcome, Resolution, Settings,
    SharedRegistry, Surface, SurfaceId, builtins, finder, handler, install_lazy_stubs, watcher,
};

// --- Fixtures ----------------------------------------------------------------

fn engine_with(settings: Settings) -> (Engine, CollectingReporter) {
    let reporter = CollectingReporter::new();
    let engine = Engine::with_reporter(settings, Arc::new(reporter.clone())).unwrap();
    (engine, reporter)
}

fn engine() -> (Engine, CollectingReporter) {
    engine_with(Settings::default())
}

fn register(engine: &Engine, name: &str, handler: Handler) {
    engine.registry().update(|reg| {
        reg.register(name, Command::new(handler));
    });
}

fn counter() -> (Handler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let h = handler(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (h, calls)
}

fn replying(reply: &'static str) -> Handler {
    handler(move |host, query| {
        host.answer(query, Some(reply));
        Ok(())
    })
}

/// Records `(args, current_text)` for every call.
fn recorder() -> (Handler, Arc<Mutex<Vec<(String, String)>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&calls);
    let h = handler(move |_, query| {
        log.lock().push((query.args().to_string(), query.current_text().to_string()));
        Ok(())
    });
    (h, calls)
}

fn text_changed(engine: &mut Engine, surface: &mut MemorySurface) -> Option<crate::DispatchReport> {
    engine.handle_event(surface, EventKind::TextChanged)
}

// --- Dispatch ----------------------------------------------------------------

#[test]
fn identical_text_is_processed_once() {
    let (mut engine, _) = engine();
    let (greet, calls) = counter();
    register(&engine, "greet", greet);

    let mut surface = MemorySurface::new(1, "{greet}$");
    assert!(text_changed(&mut engine, &mut surface).is_some());
    assert!(text_changed(&mut engine, &mut surface).is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    surface.type_text("{greet}$ again");
    assert!(text_changed(&mut engine, &mut surface).is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn dedupe_is_tracked_per_surface() {
    let (mut engine, _) = engine();
    let (greet, calls) = counter();
    register(&engine, "greet", greet);

    let mut first = MemorySurface::new(1, "{greet}$");
    let mut second = MemorySurface::new(2, "{greet}$");
    text_changed(&mut engine, &mut first);
    text_changed(&mut engine, &mut second);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn answered_text_does_not_retrigger() {
    let (mut engine, _) = engine();
    register(&engine, "greet", replying("hello"));

    let mut surface = MemorySurface::new(1, "{greet}$");
    let report = text_changed(&mut engine, &mut surface).unwrap();
    assert_eq!(report.text, "hello");
    assert_eq!(surface.text(), "hello");
    // The surface echoes our own write back as a text change.
    assert!(text_changed(&mut engine, &mut surface).is_none());
}

#[test]
fn bare_trigger_runs_once_with_empty_args() {
    let (mut engine, _) = engine();
    let (greet, calls) = recorder();
    register(&engine, "greet", greet);

    let mut surface = MemorySurface::new(1, "{greet}$");
    let report = text_changed(&mut engine, &mut surface).unwrap();

    assert_eq!(*calls.lock(), vec![(String::new(), "{greet}$".to_string())]);
    assert_eq!(report.dispatched(), 1);
    assert_eq!(report.occurrences[0].resolution, Resolution::Command("greet".into()));
}

#[test]
fn occurrences_run_left_to_right_on_updated_text() {
    let (mut engine, _) = engine();
    let (b, calls) = recorder();
    register(&engine, "a", replying("A"));
    register(&engine, "b", handler(move |host, query| {
        b(host, query)?;
        host.answer(query, Some("B"));
        Ok(())
    }));

    let mut surface = MemorySurface::new(1, "{a}$ {b}$");
    let report = text_changed(&mut engine, &mut surface).unwrap();

    assert_eq!(calls.lock()[0].1, "A {b}$");
    assert_eq!(surface.text(), "A B");
    let names: Vec<_> = report.occurrences.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
}

#[test]
fn matches_come_from_the_pre_dispatch_text() {
    let (mut engine, _) = engine();
    let (late, calls) = counter();
    register(&engine, "late", late);
    // The answer contains a trigger; it must not run in this pass.
    register(&engine, "make", replying("{late}$"));

    let mut surface = MemorySurface::new(1, "{make}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "{late}$");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_names_are_skipped_silently() {
    let (mut engine, reporter) = engine();
    let mut surface = MemorySurface::new(1, "{nope}$");
    let report = text_changed(&mut engine, &mut surface).unwrap();

    assert_eq!(report.skipped(), 1);
    assert_eq!(report.occurrences[0].resolution, Resolution::Missing);
    assert_eq!(surface.text(), "{nope}$");
    assert!(reporter.is_empty());
}

#[test]
fn absent_text_reads_as_empty() {
    let (mut engine, _) = engine();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    engine.registry().update(|reg| {
        reg.register_watcher(
            watcher(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            EventMask::TEXT_CHANGED,
        )
    });
    let mut surface = MemorySurface::new(1, "{x}$");
    surface.clear_text();

    let report = text_changed(&mut engine, &mut surface).unwrap();
    assert_eq!(report.text, "");
    assert!(report.occurrences.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(text_changed(&mut engine, &mut surface).is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn handler_failures_do_not_stop_the_pass() {
    let (mut engine, reporter) = engine();
    register(&engine, "boom", handler(|_, _| panic!("exploded")));
    register(&engine, "fail", handler(|_, _| Err("nope".into())));
    register(&engine, "ok", replying("fine"));

    let mut surface = MemorySurface::new(1, "{boom}$ {fail}$ {ok}$");
    let report = text_changed(&mut engine, &mut surface).unwrap();

    assert_eq!(surface.text(), "{boom}$ {fail}$ fine");
    assert_eq!(report.occurrences[0].outcome, Outcome::Failed("panicked: exploded".into()));
    assert_eq!(report.occurrences[1].outcome, Outcome::Failed("nope".into()));
    assert_eq!(report.occurrences[2].outcome, Outcome::Completed);

    let sources: Vec<_> = reporter.take().into_iter().map(|f| f.source).collect();
    assert_eq!(sources, vec![FailureSource::Command("boom".into()), FailureSource::Command("fail".into())]);
}

#[test]
fn registrations_apply_from_the_next_event() {
    let (mut engine, _) = engine();
    let (late, calls) = counter();
    let late = Arc::new(Mutex::new(Some(late)));
    register(&engine, "install", handler(move |host, _| {
        if let Some(late) = late.lock().take() {
            host.registry().update(|reg| reg.register("late", Command::new(late)));
        }
        Ok(())
    }));

    let mut surface = MemorySurface::new(1, "{install}$ {late}$");
    let report = text_changed(&mut engine, &mut surface).unwrap();
    assert_eq!(report.occurrences[1].outcome, Outcome::Skipped);

    surface.type_text("{late}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn custom_pattern_with_named_groups() {
    let settings = Settings { pattern: r"<(?P<name>\w+)(?: (?P<args>[^>]*))?>".into(), ..Settings::default() };
    let (mut engine, _) = engine_with(settings);
    register(&engine, "echo", handler(|host, query| {
        let reply = query.args().to_string();
        host.answer(query, Some(&reply));
        Ok(())
    }));

    let mut surface = MemorySurface::new(1, "say <echo hi there>");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "say hi there");
}

#[test]
fn command_macro_builds_registrable_commands() {
    let (mut engine, _) = engine();
    let cmd = command! {
        category: "text",
        description: "reverse the args",
        run: |host, query| {
            let reply: String = query.args().chars().rev().collect();
            host.answer(query, Some(&reply));
            Ok(())
        },
    };
    engine.registry().update(|reg| reg.register("rev", cmd));

    let mut surface = MemorySurface::new(1, "{rev abc}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "cba");
    assert_eq!(engine.registry().snapshot().command("rev").and_then(|c| c.category.clone()), Some("text".into()));
}

// --- Aliases and finders -----------------------------------------------------

#[test]
fn aliases_resolve_before_lookup() {
    let settings = Settings { aliases: HashMap::from([("e".to_string(), "echo".to_string())]), ..Settings::default() };
    let (mut engine, _) = engine_with(settings);
    register(&engine, "echo", replying("echoed"));

    let mut surface = MemorySurface::new(1, "{e}$");
    let report = text_changed(&mut engine, &mut surface).unwrap();
    assert_eq!(surface.text(), "echoed");
    assert_eq!(report.occurrences[0].name, "e");
    assert_eq!(report.occurrences[0].resolution, Resolution::Command("echo".into()));
}

#[test]
fn finders_see_the_typed_name() {
    let settings = Settings { aliases: HashMap::from([("e".to_string(), "echo".to_string())]), ..Settings::default() };
    let (mut engine, _) = engine_with(settings);
    register(&engine, "echo", replying("echoed"));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    engine.registry().update(|reg| {
        reg.register_finder(finder(move |name, _, candidate| {
            log.lock().push((name.to_string(), candidate.is_some()));
            Ok(FinderOutcome::unchanged())
        }))
    });

    let mut surface = MemorySurface::new(1, "{e}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(*seen.lock(), vec![("e".to_string(), true)]);
}

#[test]
fn finder_supplies_unregistered_command() {
    let (mut engine, _) = engine();
    let id = engine.registry().update(|reg| {
        reg.register_finder(finder(|name, _, _| {
            Ok(if name == "x" { FinderOutcome::handler(replying("found")) } else { FinderOutcome::unchanged() })
        }))
    });

    let mut surface = MemorySurface::new(1, "{x}$ {y}$");
    let report = text_changed(&mut engine, &mut surface).unwrap();
    assert_eq!(surface.text(), "found {y}$");
    assert_eq!(report.occurrences[0].resolution, Resolution::Finder(id));
    assert_eq!(report.occurrences[1].resolution, Resolution::Missing);
}

#[test]
fn finders_chain_and_rewrite_args() {
    let (mut engine, _) = engine();
    let (echo, calls) = recorder();
    register(&engine, "echo", echo);
    engine.registry().update(|reg| {
        reg.register_finder(finder(|_, args, _| Ok(FinderOutcome::unchanged().with_args(format!("{args}!")))));
        reg.register_finder(finder(|_, args, _| Ok(FinderOutcome::unchanged().with_args(format!("<{args}>")))));
    });

    let mut surface = MemorySurface::new(1, "{echo hi}$");
    let report = text_changed(&mut engine, &mut surface).unwrap();
    assert_eq!(calls.lock()[0].0, "<hi!>");
    assert_eq!(report.occurrences[0].args, "<hi!>");
}

#[test]
fn failing_finder_is_reported_and_skipped() {
    let (mut engine, reporter) = engine();
    let broken = engine.registry().update(|reg| {
        let broken = reg.register_finder(finder(|_, _, _| Err("finder broke".into())));
        reg.register_finder(finder(|_, _, _| Ok(FinderOutcome::handler(replying("rescued")))));
        broken
    });

    let mut surface = MemorySurface::new(1, "{anything}$");
    let report = text_changed(&mut engine, &mut surface).unwrap();
    assert_eq!(surface.text(), "rescued");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(reporter.take()[0].source, FailureSource::Finder(broken));
}

// --- Watchers ----------------------------------------------------------------

#[test]
fn watchers_follow_their_masks() {
    let (mut engine, reporter) = engine();
    let text_calls = Arc::new(AtomicUsize::new(0));
    let all_calls = Arc::new(AtomicUsize::new(0));
    let (t, a) = (Arc::clone(&text_calls), Arc::clone(&all_calls));
    engine.registry().update(|reg| {
        reg.register_watcher(watcher(move |_, _| {
            t.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }), EventMask::default());
        reg.register_watcher(watcher(move |_, _| {
            a.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }), EventMask::ALL);
        reg.register_watcher(watcher(|_, kind| Err(format!("saw {kind}").into())), EventMask::SELECTION_CHANGED);
    });

    let mut surface = MemorySurface::new(1, "plain");
    text_changed(&mut engine, &mut surface);
    text_changed(&mut engine, &mut surface);
    engine.handle_event(&mut surface, EventKind::SelectionChanged);

    assert_eq!(text_calls.load(Ordering::SeqCst), 1);
    assert_eq!(all_calls.load(Ordering::SeqCst), 2);
    let failures = reporter.take();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].message, "saw selection-changed");
}

// --- Menus -------------------------------------------------------------------

fn menu_engine(cancel: Option<Handler>) -> (Engine, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let (engine, _) = engine();
    let (yes, yes_calls) = counter();
    let (no, no_calls) = counter();
    register(&engine, "menu", handler(move |host, query| {
        let items = vec![
            MenuItem::text("<"),
            MenuItem::part("yes", yes.clone()),
            MenuItem::text("/"),
            MenuItem::part("no", no.clone()),
            MenuItem::text(">"),
        ];
        host.create_menu(query, items, cancel.clone());
        Ok(())
    }));
    (engine, yes_calls, no_calls)
}

#[test]
fn selecting_inside_a_part_runs_it_once() {
    let (mut engine, yes, no) = menu_engine(None);
    let mut surface = MemorySurface::new(1, "{menu}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "<yes/no>");

    surface.select(2, 3);
    engine.handle_event(&mut surface, EventKind::SelectionChanged);
    engine.handle_event(&mut surface, EventKind::SelectionChanged);
    assert_eq!(yes.load(Ordering::SeqCst), 1);
    assert_eq!(no.load(Ordering::SeqCst), 0);
    assert!(!engine.menus().is_active(surface.id()));
}

#[test]
fn selection_on_a_part_boundary_is_ignored() {
    let (mut engine, yes, _) = menu_engine(None);
    let mut surface = MemorySurface::new(1, "{menu}$");
    text_changed(&mut engine, &mut surface);

    surface.select(1, 1);
    engine.handle_event(&mut surface, EventKind::SelectionChanged);
    assert_eq!(yes.load(Ordering::SeqCst), 0);
    assert!(engine.menus().is_active(surface.id()));
}

#[test]
fn length_change_runs_cancel_action() {
    let (cancel, cancelled) = counter();
    let (mut engine, yes, _) = menu_engine(Some(cancel));
    let mut surface = MemorySurface::new(1, "{menu}$");
    text_changed(&mut engine, &mut surface);

    surface.type_text("<yes/no>?");
    surface.select(2, 3);
    engine.handle_event(&mut surface, EventKind::SelectionChanged);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    assert_eq!(yes.load(Ordering::SeqCst), 0);
    assert!(!engine.menus().is_active(surface.id()));
}

#[test]
fn cancel_without_action_clears_the_menu() {
    let (mut engine, _, _) = menu_engine(None);
    let mut surface = MemorySurface::new(1, "x {menu}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "x <yes/no>");

    surface.type_text("x <yes/no>!");
    engine.handle_event(&mut surface, EventKind::SelectionChanged);
    assert_eq!(surface.text(), "x ");
}

#[test]
fn menus_stay_inert_without_selection_tracking() {
    let settings = Settings { receive_selection_changes: false, ..Settings::default() };
    let (mut engine, _) = engine_with(settings);
    let tracked = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&tracked);
    register(&engine, "menu", handler(move |host, query| {
        let created = host.create_menu(query, vec![MenuItem::part("only", replying("picked"))], None);
        flag.store(created, Ordering::SeqCst);
        Ok(())
    }));

    let mut surface = MemorySurface::new(1, "{menu}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "only");
    assert!(!tracked.load(Ordering::SeqCst));
    assert!(!engine.menus().is_active(surface.id()));
}

// --- Answers -----------------------------------------------------------------

#[test]
fn pasted_answers_follow_settings() {
    let paste = handler(|host, query| {
        host.answer_pasted(query, Some("rich"));
        Ok(())
    });

    let (mut engine, _) = engine();
    register(&engine, "p", paste.clone());
    let mut surface = MemorySurface::new(1, "a {p}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "a rich");
    assert_eq!(surface.clipboard(), Some("rich"));

    let (mut engine, _) = engine_with(Settings { pasted_answers: false, ..Settings::default() });
    register(&engine, "p", paste);
    let mut surface = MemorySurface::new(1, "a {p}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "a rich");
    assert_eq!(surface.clipboard(), None);
}

// --- Scheduler ---------------------------------------------------------------

#[test]
fn tasks_posted_from_other_threads_run_on_drain() {
    let (mut engine, reporter) = engine();
    let scheduler = engine.scheduler().clone();
    std::thread::spawn(move || {
        scheduler.post(SurfaceId(1), |host| {
            host.surface().write_text("from thread");
            Ok(())
        })
    })
    .join()
    .unwrap();
    engine.scheduler().post(SurfaceId(9), |_| Ok(()));
    engine.scheduler().post(SurfaceId(2), |_| Err("late failure".into()));

    let mut surfaces = vec![MemorySurface::new(1, ""), MemorySurface::new(2, "")];
    assert_eq!(engine.run_pending(&mut surfaces), 2);
    assert_eq!(surfaces[0].text(), "from thread");
    assert_eq!(engine.scheduler().pending(), 0);
    assert_eq!(reporter.take()[0].source, FailureSource::Task);
}

// --- Modules -----------------------------------------------------------------

#[test]
fn unloading_a_module_removes_its_commands() {
    let (mut engine, _) = engine();
    assert!(engine.add_module(builtins()));
    assert!(engine.registry().snapshot().command("echo").is_some());

    assert!(engine.unload_module("builtin"));
    assert!(!engine.unload_module("builtin"));
    assert!(engine.registry().snapshot().commands().is_empty());
    assert!(engine.modules().is_empty());
}

#[test]
fn disabled_modules_are_not_loaded() {
    let settings = Settings { unloaded: BTreeSet::from(["builtin".to_string()]), ..Settings::default() };
    let (mut engine, _) = engine_with(settings);
    assert!(!engine.add_module(builtins()));
    assert!(engine.registry().snapshot().command("echo").is_none());
}

#[test]
fn failed_module_init_leaves_nothing_behind() {
    let (mut engine, reporter) = engine();
    let broken = ModuleSource::new("broken", |module| {
        module.register_command("half", replying("x"), None);
        Err("no luck".into())
    });
    assert!(!engine.add_module(broken));
    assert!(engine.registry().snapshot().command("half").is_none());
    assert_eq!(reporter.take()[0].source, FailureSource::Module("broken".into()));
}

#[test]
fn reload_rebuilds_from_sources() {
    let (mut engine, _) = engine();
    engine.add_module(builtins());
    register(&engine, "adhoc", replying("x"));
    engine.scheduler().post(SurfaceId(1), |_| Ok(()));

    let mut surface = MemorySurface::new(1, "{choose a b}$");
    text_changed(&mut engine, &mut surface);
    assert!(engine.menus().is_active(surface.id()));

    engine.reload();
    let snapshot = engine.registry().snapshot();
    assert!(snapshot.command("adhoc").is_none());
    assert!(snapshot.command("echo").is_some());
    assert_eq!(engine.scheduler().pending(), 0);
    assert!(!engine.menus().is_active(surface.id()));

    // Modules stay bound to the live registry after reloading.
    assert!(engine.unload_module("builtin"));
    assert!(engine.registry().snapshot().command("echo").is_none());
}

#[test]
fn registry_captured_during_init_survives_reload() {
    let (mut engine, _) = engine();
    engine.add_module(ModuleSource::new("late.rs", |module| {
        let registry = module.registry().clone();
        module.register_command(
            "reg",
            handler(move |host, query| {
                registry.update(|reg| reg.register("late", Command::new(replying("on time"))));
                host.answer(query, None);
                Ok(())
            }),
            None,
        );
        Ok(())
    }));

    engine.reload();

    let mut surface = MemorySurface::new(1, "{reg}$");
    text_changed(&mut engine, &mut surface);
    assert!(engine.registry().snapshot().command("late").is_some());

    surface.type_text("{late}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "on time");
}

#[test]
fn lazy_stubs_installed_by_a_module_survive_reload() {
    let (mut engine, _) = engine();
    let real = ModuleSource::new("tools.rs", |module| {
        module.register_command("shout", replying("LOUD"), None);
        Ok(())
    });
    let manifest = LazyManifest {
        path: "tools.rs".into(),
        commands: vec![LazyCommand { name: "shout".into(), description: None, category: None }],
    };
    let loader = real.loader();
    engine.add_module(ModuleSource::new("lazy.rs", move |module| {
        install_lazy_stubs(module.registry(), &manifest, Arc::clone(&loader));
        Ok(())
    }));

    engine.reload();

    let mut surface = MemorySurface::new(1, "{shout}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "LOUD");
}

#[test]
fn released_surface_is_processed_afresh() {
    let (mut engine, yes, _) = menu_engine(None);
    let (greet, calls) = counter();
    register(&engine, "greet", greet);

    let mut surface = MemorySurface::new(1, "{menu}$");
    text_changed(&mut engine, &mut surface);
    assert!(engine.menus().is_active(surface.id()));
    engine.release_surface(surface.id());
    assert!(!engine.menus().is_active(surface.id()));

    surface.select(2, 3);
    engine.handle_event(&mut surface, EventKind::SelectionChanged);
    assert_eq!(yes.load(Ordering::SeqCst), 0);

    surface.type_text("{greet}$");
    text_changed(&mut engine, &mut surface);
    assert!(text_changed(&mut engine, &mut surface).is_none());
    engine.release_surface(surface.id());
    assert!(text_changed(&mut engine, &mut surface).is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn reload_with_rejects_bad_patterns() {
    let (mut engine, _) = engine();
    register(&engine, "echo", replying("ok"));
    let err = engine.reload_with(Settings { pattern: "(".into(), ..Settings::default() }).unwrap_err();
    assert!(matches!(err, Error::InvalidPattern(_)));

    let mut surface = MemorySurface::new(1, "{echo}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "ok");
}

#[test]
fn lazy_stubs_load_once_and_forward() {
    let (mut engine, _) = engine();
    let loads = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&loads);
    let source = ModuleSource::new("tools", move |module| {
        counted.fetch_add(1, Ordering::SeqCst);
        module.register_command(
            "shout",
            handler(|host, query| {
                let reply = query.args().to_uppercase();
                host.answer(query, Some(&reply));
                Ok(())
            }),
            Some("loud"),
        );
        Ok(())
    });
    let manifest = LazyManifest {
        path: "tools".into(),
        commands: vec![LazyCommand { name: "shout".into(), description: Some("loud".into()), category: None }],
    };

    assert_eq!(install_lazy_stubs(engine.registry(), &manifest, source.loader()), 1);
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(
        engine.registry().snapshot().command("shout").and_then(|c| c.description.clone()),
        Some("loud".to_string())
    );

    let mut first = MemorySurface::new(1, "{shout hi}$");
    text_changed(&mut engine, &mut first);
    let mut second = MemorySurface::new(2, "{shout yo}$");
    text_changed(&mut engine, &mut second);

    assert_eq!(first.text(), "HI");
    assert_eq!(second.text(), "YO");
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

fn load_nothing(_: &SharedRegistry) -> HandlerResult {
    Ok(())
}

#[test]
fn lazy_stub_without_real_command_fails_cleanly() {
    let (mut engine, reporter) = engine();
    let manifest = LazyManifest {
        path: "ghosts".into(),
        commands: vec![LazyCommand { name: "ghost".into(), description: None, category: None }],
    };
    install_lazy_stubs(engine.registry(), &manifest, Arc::new(load_nothing));

    let mut surface = MemorySurface::new(1, "{ghost}$");
    text_changed(&mut engine, &mut surface);
    assert_eq!(surface.text(), "{ghost}$");
    let failures = reporter.take();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.contains("was not provided"));
}
