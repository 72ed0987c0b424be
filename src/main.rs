mod debug_report;

use inkline::{CollectingReporter, Engine, EventKind, MemorySurface, Settings, TriggerPattern, builtins};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "INKLINE_LOG";

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    init_tracing();

    let settings = match load_settings(&config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    let reporter = CollectingReporter::new();
    let mut engine = match Engine::with_reporter(settings, Arc::new(reporter.clone())) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };
    engine.add_module(builtins());

    let mut surface = MemorySurface::new(1, config.input.clone());
    let end = config.input.chars().count();
    surface.select(end, end);

    let report = engine.handle_event(&mut surface, EventKind::TextChanged);
    if let Some((start, end)) = config.select {
        surface.select(start, end);
        engine.handle_event(&mut surface, EventKind::SelectionChanged);
    }
    engine.run_pending(&mut surface);

    debug_report::print_run(&config.input, report.as_ref(), &surface, &reporter.take(), config.color);
}

struct CliConfig {
    input: String,
    settings: Option<PathBuf>,
    select: Option<(usize, usize)>,
    strict: bool,
    color: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second subscriber only matters in tests; ignore it.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).try_init();
}

fn load_settings(config: &CliConfig) -> inkline::Result<Settings> {
    let mut settings = match &config.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if config.strict {
        settings.pattern = TriggerPattern::strict().as_str().to_string();
    }
    Ok(settings)
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<String> = None;
    let mut settings = None;
    let mut select = None;
    let mut strict = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("inkline {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--strict" => strict = true,
            "--config" | "-c" => {
                let value = args.next().ok_or_else(|| "error: --config expects a value".to_string())?;
                settings = Some(PathBuf::from(value));
            }
            "--select" => {
                let value = args.next().ok_or_else(|| "error: --select expects a value".to_string())?;
                select = Some(parse_selection(&value)?);
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.is_empty() {
                    if input.is_some() {
                        return Err("error: input provided multiple times".to_string());
                    }
                    input = Some(rest);
                }
                break;
            }
            _ if arg.starts_with("--config=") => {
                settings = Some(PathBuf::from(arg.trim_start_matches("--config=")));
            }
            _ if arg.starts_with("--select=") => {
                select = Some(parse_selection(arg.trim_start_matches("--select="))?);
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(rest);
                break;
            }
        }
    }

    let input = match input {
        Some(value) => value,
        None => read_stdin_input()?,
    };

    if input.trim().is_empty() {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }

    Ok(CliConfig { input, settings, select, strict, color })
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer.trim_end_matches(['\r', '\n']).to_string())
}

fn parse_selection(value: &str) -> Result<(usize, usize), String> {
    let invalid = || format!("error: invalid --select '{value}' (expected START:END)");
    let (start, end) = value.split_once(':').ok_or_else(invalid)?;
    let start = start.trim().parse().map_err(|_| invalid())?;
    let end = end.trim().parse().map_err(|_| invalid())?;
    Ok((start, end))
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "inkline {version}

Replays text through the trigger engine with the built-in commands loaded.

Usage:
  inkline [OPTIONS] [--] <text...>

Options:
  -c, --config <path>        Settings file (TOML).
  --select <start:end>       After the text pass, move the selection here and
                             send a selection change (drives menus).
  --strict                   Use the strict trigger grammar.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Text is read from stdin when no args are given. The caret starts at the end.
Set {log_env}=inkline=trace to see resolution traces on stderr.

Exit codes:
  0  Success.
  2  Invalid arguments, settings or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        log_env = LOG_ENV,
    )
}
