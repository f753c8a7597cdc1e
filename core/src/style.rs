use colored::{Color, ColoredString, Colorize};
use crossterm::terminal;

use crate::store::ResultStore;

#[macro_export]
macro_rules! print_success {
    ($fmt:literal, $($e:tt)*) => {
        use ::colored::Colorize as _;
        println!("{}", format!($fmt, $($e)*).green())
    }
}

pub fn is_truecolor_supported() -> bool {
    let Ok(v) = std::env::var("COLORTERM") else {
        return false
    };
    matches!(v.as_str(), "truecolor" | "24bit")
}

fn verdict_color(passed: bool) -> Color {
    match (passed, is_truecolor_supported()) {
        (true, false) => Color::Green,
        (false, false) => Color::Red,
        (true, true) => Color::TrueColor {
            r: 30,
            g: 180,
            b: 40,
        },
        (false, true) => Color::TrueColor {
            r: 220,
            g: 42,
            b: 42,
        },
    }
}

pub fn verdict_icon(passed: bool) -> ColoredString {
    let label = if passed { " PASS " } else { " FAIL " };
    label
        .on_color(verdict_color(passed))
        .bold()
        .color(Color::BrightWhite)
}

/// One line per submission with its pass/fail counts, framed to the
/// terminal width.
pub fn print_session_summary(store: &ResultStore) {
    let (cols, _) = terminal::size().unwrap_or((80, 40));
    let bold_bar = "━".repeat(cols as usize).blue().bold();

    println!("\n{}", bold_bar);
    if store.is_empty() {
        println!("{}", "<NO SUBMISSION GRADED>".magenta().dimmed());
    }

    let width = store.submissions().map(str::len).max().unwrap_or(0);
    for sub in store.submissions() {
        let (passed, failed) = store.tally(sub);
        println!(
            "{} {}  {} {}",
            verdict_icon(failed == 0),
            format!("{:<width$}", sub, width = width).bold(),
            format!("{} passed", passed).green(),
            format!("{} failed", failed).bright_red(),
        );
    }
    println!("{}", bold_bar);
}
