use colored::{Color, Colorize};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::{self, Stdout, Write};

/// Prefixes output lines with a per-service color.
pub struct Logger<W: Write = Stdout> {
    output: W,
}

impl<W: Write> Logger<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    fn service_color(service: &str) -> Color {
        let colors = [
            Color::Green,
            Color::Blue,
            Color::Magenta,
            Color::Cyan,
            Color::BrightGreen,
            Color::BrightBlue,
            Color::BrightMagenta,
            Color::BrightCyan,
        ];

        let mut hasher = DefaultHasher::new();
        service.hash(&mut hasher);
        let hash = hasher.finish();

        let idx = usize::try_from(hash).unwrap_or_default() % colors.len();
        colors[idx]
    }

    fn write_prefixed(&mut self, prefix: &str, message: &str) {
        for line in message.lines() {
            let _ = writeln!(self.output, "{prefix} {line}");
        }
    }

    pub fn log(&mut self, service: &str, message: &str) {
        let prefix = format!("[{service}]")
            .color(Self::service_color(service))
            .to_string();
        self.write_prefixed(&prefix, message);
    }

    pub fn system(&mut self, message: &str) {
        let prefix = "[devdesk]".color(Color::Yellow).to_string();
        self.write_prefixed(&prefix, message);
    }

    pub fn error(&mut self, message: &str) {
        let prefix = "[devdesk]".color(Color::Red).bold().to_string();
        self.write_prefixed(&prefix, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(io::stdout())
    }
}
