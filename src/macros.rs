#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build a [`Command`](crate::Command) from a closure body.
///
/// ```
/// use inkline::command;
///
/// let cmd = command! {
///     category: "text",
///     description: "Replace the trigger with its arguments",
///     run: |host, query| {
///         let reply = query.args().to_string();
///         host.answer(query, Some(&reply));
///         Ok(())
///     },
/// };
/// assert_eq!(cmd.category.as_deref(), Some("text"));
/// ```
#[macro_export]
macro_rules! command {
    (
        $(category: $category:expr,)?
        $(description: $description:expr,)?
        run: |$host:ident, $query:ident| $body:block
        $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut command = $crate::Command::new($crate::handler(move |$host, $query| $body));
        $(command = command.with_category($category);)?
        $(command = command.with_description($description);)?
        command
    }};
}
