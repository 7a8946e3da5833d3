use console::style;
use std::fmt::Display;

/// Blue: raw generator text as it streams
pub fn generator<D: Display>(text: D) -> String {
    style(text).blue().to_string()
}

/// Yellow: auditor activity
pub fn audit<D: Display>(text: D) -> String {
    style(text).yellow().to_string()
}

/// Green bold: passed ideas, verified answers
pub fn success<D: Display>(text: D) -> String {
    style(text).green().bold().to_string()
}

/// Magenta bold: takeovers
pub fn takeover<D: Display>(text: D) -> String {
    style(text).magenta().bold().to_string()
}

/// Red bold: rejections, escalations, errors
pub fn error<D: Display>(text: D) -> String {
    style(text).red().bold().to_string()
}

/// Cyan: system notices
pub fn system<D: Display>(text: D) -> String {
    style(text).cyan().to_string()
}

/// White bold: section headers, titles
pub fn header<D: Display>(text: D) -> String {
    style(text).white().bold().to_string()
}

/// Dim: secondary text, decorative lines
pub fn dim<D: Display>(text: D) -> String {
    style(text).dim().to_string()
}

/// One line explaining the colors used while a session streams.
pub fn legend() -> String {
    format!(
        "{} {} {} {} {}",
        generator("■ generator"),
        audit("■ audit"),
        success("■ pass"),
        takeover("■ takeover"),
        error("■ error"),
    )
}
