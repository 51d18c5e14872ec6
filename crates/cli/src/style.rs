//! Terminal styling for command output.

use console::Style;

fn marked(mark: &str, style: Style, msg: &str) -> String {
    format!("{} {}", style.apply_to(mark), msg)
}

/// Green check mark before `msg`.
pub fn success(msg: &str) -> String {
    marked("✓", Style::new().green(), msg)
}

/// Red cross before `msg`.
pub fn error(msg: &str) -> String {
    marked("✗", Style::new().red(), msg)
}

pub fn warn(msg: &str) -> String {
    marked("⚠", Style::new().yellow(), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// "set" / "NOT SET" marker for the token.
pub fn presence(is_set: bool) -> String {
    if is_set {
        Style::new().green().apply_to("set").to_string()
    } else {
        Style::new().red().apply_to("NOT SET").to_string()
    }
}
