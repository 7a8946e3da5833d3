use super::style;
use crate::audit::{AuditObserver, SessionEvent};
use std::io::Write;

/// Renders session progress to stdout with the color legend from
/// [`style::legend`].
pub struct CliObserver {
    /// Also print per-idea audit chatter.
    verbose: bool,
}

impl CliObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn render(&self, event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::AttemptStarted {
                attempt,
                temperature,
            } => (*attempt > 1 || self.verbose).then(|| {
                format!(
                    "\n{}\n",
                    style::system(format!("[SYSTEM] attempt {attempt} (temperature {temperature:.2})"))
                )
            }),
            SessionEvent::Narrative { text } => Some(style::generator(text)),
            SessionEvent::IdeaSubmitted { position, text } => Some(format!(
                "\n{}{}",
                style::generator(format!("<idea #{}> {text}", position + 1)),
                if self.verbose {
                    format!("\n{}", style::audit("[AUDIT] checking..."))
                } else {
                    String::new()
                }
            )),
            SessionEvent::IdeaPassed { position, .. } => Some(format!(
                "\n{}",
                style::success(format!("[AUDIT] idea #{} passed ✓", position + 1))
            )),
            SessionEvent::IdeaRejected {
                position,
                code,
                reason,
                ..
            } => Some(format!(
                "\n{}\n{}",
                style::error(format!("[AUDIT] idea #{} failed ✗ ({code})", position + 1)),
                style::dim(reason)
            )),
            SessionEvent::Takeover {
                retry_count,
                total_takeovers,
                suggestion,
                ..
            } => {
                let mut out = format!(
                    "\n{}",
                    style::takeover(format!(
                        "[TAKEOVER] intervention appended (retry {retry_count}, total {total_takeovers})"
                    ))
                );
                if let Some(suggestion) = suggestion {
                    out.push_str(&format!("\n{}", style::takeover(format!("  fix: {suggestion}"))));
                }
                Some(out)
            }
            SessionEvent::AnswerReady { .. } => None,
            SessionEvent::Escalated {
                reason,
                position,
                failures,
            } => Some(format!(
                "\n{}",
                style::error(format!(
                    "[SYSTEM] escalated: {reason} at idea #{} after {failures} failure(s)",
                    position + 1
                ))
            )),
            SessionEvent::StreamRestarted { restarts, cause } => Some(format!(
                "\n{}",
                style::error(format!("[WARNING] stream restarted ({restarts}): {cause}"))
            )),
        }
    }
}

impl AuditObserver for CliObserver {
    fn record_event(&self, event: &SessionEvent) {
        if let Some(text) = self.render(event) {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "{text}");
            let _ = stdout.flush();
        }
    }

    fn name(&self) -> &str {
        "cli"
    }
}
