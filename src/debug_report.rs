use inkline::{DispatchReport, Failure, MemorySurface, Outcome, Resolution};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(
    input: &str,
    report: Option<&DispatchReport>,
    surface: &MemorySurface,
    failures: &[Failure],
    color: bool,
) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Input: {input:?}"), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Occurrences ━━━", ansi::GRAY));
    match report {
        Some(report) if !report.occurrences.is_empty() => print_occurrences(report, &palette),
        Some(_) => {
            println!("{}", palette.dim("  No triggers found"));
            println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
            println!("  • The text has no `{{name args}}$` expression");
            println!("  • A custom pattern in the settings does not match");
            println!("  • --strict rejects names with digits or punctuation");
        }
        None => println!("{}", palette.dim("  Text was not processed")),
    }

    println!("\n{}", palette.paint("━━━ Result ━━━", ansi::GRAY));
    let (start, end) = surface.selection();
    println!("  {}", palette.bold(palette.paint(format!("{:?}", surface.text()), ansi::GREEN)));
    println!("  {} {}", palette.dim("selection:"), palette.paint(format!("{start}..{end}"), ansi::YELLOW));

    if !failures.is_empty() {
        println!("\n{}", palette.paint("━━━ Failures ━━━", ansi::GRAY));
        for failure in failures {
            println!("  {}", palette.paint(failure.to_string(), ansi::RED));
        }
    }

    if let Some(report) = report {
        println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
        println!(
            "  Pass: {}  │  Dispatched: {}  │  Skipped: {}",
            palette.paint(format!("{:?}", report.elapsed), ansi::GREEN),
            palette.paint(report.dispatched().to_string(), ansi::CYAN),
            palette.dim(report.skipped().to_string()),
        );
    }
    println!();
}

fn print_occurrences(report: &DispatchReport, palette: &ansi::Palette) {
    for (idx, occ) in report.occurrences.iter().enumerate() {
        println!(
            "  {} {} {} {}",
            palette.paint(format!("[{idx}]"), ansi::GRAY),
            palette.bold(palette.paint(&occ.expression, ansi::GREEN)),
            palette.dim("│"),
            fmt_outcome(&occ.outcome, palette),
        );
        println!(
            "      {} {}  {} {}  {} {}",
            palette.dim("name:"),
            palette.paint(&occ.name, ansi::BLUE),
            palette.dim("│ args:"),
            palette.paint(format!("{:?}", occ.args), ansi::YELLOW),
            palette.dim("│ via:"),
            fmt_resolution(&occ.resolution, palette),
        );
    }
}

fn fmt_resolution(resolution: &Resolution, palette: &ansi::Palette) -> String {
    match resolution {
        Resolution::Command(name) => palette.paint(format!("command {name}"), ansi::CYAN),
        Resolution::Finder(id) => palette.paint(format!("finder {id}"), ansi::CYAN),
        Resolution::Missing => palette.dim("nothing"),
    }
}

fn fmt_outcome(outcome: &Outcome, palette: &ansi::Palette) -> String {
    match outcome {
        Outcome::Completed => palette.paint("✓ completed", ansi::GREEN),
        Outcome::Failed(message) => palette.paint(format!("✗ failed: {message}"), ansi::RED),
        Outcome::Skipped => palette.dim("– skipped"),
    }
}
