//! Handler wrappers and the built-in command module.
//!
//! The wrappers cover the two argument checks most commands start with:
//!
//! - [`with_arity`]: tokenize the args and require an exact token count.
//! - [`requires_args`]: require non-empty args.
//!
//! [`builtins`] is a small internal module used by the CLI and as a working
//! example of the module protocol.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;

use crate::api::Host;
use crate::engine::{MenuItem, Query};
use crate::error::HandlerError;
use crate::module::ModuleSource;
use crate::surface::{Surface, byte_offset};
use crate::tokenizer::{tokenize, tokenize_quoted};
use crate::{Handler, HandlerResult, handler};

/// A handler that also receives the tokenized arguments.
pub type ArgsHandler = Arc<dyn Fn(&mut Host<'_>, &mut Query, Vec<String>) -> HandlerResult + Send + Sync>;

/// Call `f` only when the args tokenize to exactly `count` tokens.
///
/// Otherwise `on_error` runs, or the expression is answered with
/// `"Wrong arguments"`.
pub fn with_arity<F>(count: usize, f: F, on_error: Option<Handler>) -> Handler
where
    F: Fn(&mut Host<'_>, &mut Query, Vec<String>) -> HandlerResult + Send + Sync + 'static,
{
    let f: ArgsHandler = Arc::new(f);
    handler(move |host, query| {
        let args = tokenize(query.args());
        if args.len() == count {
            return f(host, query, args);
        }
        match &on_error {
            Some(on_error) => on_error(host, query),
            None => {
                host.answer(query, Some("Wrong arguments"));
                Ok(())
            }
        }
    })
}

/// Call `inner` only when the args are non-empty.
///
/// Otherwise `on_error` runs, or the expression is answered with
/// `"Empty argument"`.
pub fn requires_args(inner: Handler, on_error: Option<Handler>) -> Handler {
    handler(move |host, query| {
        if !query.args().is_empty() {
            return inner(host, query);
        }
        match &on_error {
            Some(on_error) => on_error(host, query),
            None => {
                host.answer(query, Some("Empty argument"));
                Ok(())
            }
        }
    })
}

/// Insert `text` at the caret of `surface`.
fn insert_at_caret(surface: &mut dyn Surface, text: &str) -> bool {
    let Some(mut current) = surface.read_text() else {
        return false;
    };
    let (caret, _) = surface.read_selection();
    current.insert_str(byte_offset(&current, caret), text);
    let caret = caret + text.chars().count();
    surface.write_text(&current) && surface.write_selection(caret, caret)
}

/// The built-in command module.
///
/// | command  | args              | effect                                        |
/// |----------|-------------------|-----------------------------------------------|
/// | `echo`   | any               | replaces the trigger with its args            |
/// | `upper`  | required          | upper-cases the args                          |
/// | `args`   | any               | shows how the args tokenize                   |
/// | `date`   | optional format   | current local date (chrono format string)     |
/// | `help`   | optional name     | lists commands, or describes one              |
/// | `choose` | required          | menu of the tokens; selecting one inserts it  |
/// | `later`  | `<millis> <text>` | erases the trigger, inserts `text` after delay |
pub fn builtins() -> ModuleSource {
    ModuleSource::new("builtin", |module| {
        module.set_category("builtin");

        module.register_command(
            "echo",
            handler(|host, query| {
                let reply = query.args().to_string();
                host.answer(query, Some(&reply));
                Ok(())
            }),
            Some("Replace the trigger with its arguments"),
        );

        module.register_command(
            "upper",
            requires_args(
                handler(|host, query| {
                    let reply = query.args().to_uppercase();
                    host.answer(query, Some(&reply));
                    Ok(())
                }),
                None,
            ),
            Some("Upper-case the arguments"),
        );

        module.register_command(
            "args",
            handler(|host, query| {
                let reply = tokenize_quoted(query.args()).join(" ");
                host.answer(query, Some(&reply));
                Ok(())
            }),
            Some("Show the tokenized arguments"),
        );

        module.register_command(
            "date",
            handler(|host, query| {
                let format = if query.args().is_empty() { "%Y-%m-%d" } else { query.args() };
                let mut reply = String::new();
                write!(reply, "{}", Local::now().format(format))
                    .map_err(|_| HandlerError::new(format!("invalid date format `{format}`")))?;
                host.answer(query, Some(&reply));
                Ok(())
            }),
            Some("Insert the current date"),
        );

        module.register_command(
            "help",
            handler(|host, query| {
                let snapshot = host.registry().snapshot();
                let reply = if query.args().is_empty() {
                    snapshot.commands().into_iter().map(|(name, _)| name).collect::<Vec<_>>().join(", ")
                } else {
                    let name = snapshot.resolve_alias(query.args());
                    match snapshot.command(name) {
                        Some(command) => {
                            format!("{name}: {}", command.description.as_deref().unwrap_or("no description"))
                        }
                        None => format!("{name}: unknown command"),
                    }
                };
                host.answer(query, Some(&reply));
                Ok(())
            }),
            Some("List commands or describe one"),
        );

        module.register_command(
            "choose",
            requires_args(
                handler(|host, query| {
                    let mut items = Vec::new();
                    for (idx, option) in tokenize(query.args()).into_iter().enumerate() {
                        if idx > 0 {
                            items.push(MenuItem::text(" | "));
                        }
                        let caption = option.clone();
                        let action = handler(move |host, query| {
                            host.answer(query, Some(&caption));
                            Ok(())
                        });
                        items.push(MenuItem::part(option, action));
                    }
                    host.create_menu(query, items, None);
                    Ok(())
                }),
                None,
            ),
            Some("Offer a menu of the arguments"),
        );

        module.register_command(
            "later",
            with_arity(
                2,
                |host, query, args| {
                    let delay: u64 =
                        args[0].parse().map_err(|_| HandlerError::new(format!("invalid delay `{}`", args[0])))?;
                    let text = args[1].clone();
                    host.answer(query, None);
                    let surface = host.surface_id();
                    host.scheduler().post_after(surface, Duration::from_millis(delay), move |host| {
                        if insert_at_caret(host.surface(), &text) {
                            Ok(())
                        } else {
                            Err(HandlerError::new("surface rejected the delayed text"))
                        }
                    });
                    Ok(())
                },
                None,
            ),
            Some("Insert text after a delay in milliseconds"),
        );

        Ok(())
    })
    .internal()
}
