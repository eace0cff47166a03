use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

const COMPONENT_WIDTH: usize = 16;
const LOG_LEVEL_WIDTH: usize = 9;

/// Log line layout: `[timestamp] [component] [level] message key=value`
pub struct KioskLogFormatter {
    default_component: String,
    color_enabled: bool,
}

/// Log with a `component` field, rendered as `kiosk-<component>`
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(component = $component, $($arg)*)
    };
}

#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(component = $component, $($arg)*)
    };
}

#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(component = $component, $($arg)*)
    };
}

#[macro_export]
macro_rules! component_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(component = $component, $($arg)*)
    };
}

impl KioskLogFormatter {
    pub fn new(default_component: impl Into<String>) -> Self {
        Self {
            default_component: default_component.into(),
            color_enabled: color_supported(),
        }
    }

    #[cfg(test)]
    fn plain(default_component: &str) -> Self {
        Self {
            default_component: default_component.to_string(),
            color_enabled: false,
        }
    }

    /// Explicit component first, then the emitting crate, then the default
    fn component_name(&self, component: Option<&str>, target: &str) -> String {
        let name = match component {
            Some(comp) => format!("kiosk-{}", comp),
            None => match target.split("::").next() {
                Some("kiosk_session") => "kiosk-session".to_string(),
                Some("kiosk_wire") => "kiosk-wire".to_string(),
                _ => self.default_component.clone(),
            },
        };

        if name.chars().count() > COMPONENT_WIDTH {
            let cut: String = name.chars().take(COMPONENT_WIDTH - 1).collect();
            format!("{}…", cut)
        } else {
            format!("{:<width$}", name, width = COMPONENT_WIDTH)
        }
    }

    fn level_label(level: &Level) -> String {
        let label = match *level {
            Level::ERROR => "✗ ERROR",
            Level::WARN => "⚠ WARN",
            Level::INFO => "ℹ INFO",
            Level::DEBUG => "◦ DEBUG",
            Level::TRACE => "◦ TRACE",
        };
        format!("{:<width$}", label, width = LOG_LEVEL_WIDTH)
    }

    fn level_color(&self, level: &Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }
        match *level {
            Level::ERROR => COLOR_BRIGHT_RED,
            Level::WARN => COLOR_BRIGHT_YELLOW,
            Level::INFO => COLOR_GREEN,
            Level::DEBUG | Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }

    fn write_line(
        &self,
        writer: &mut dyn fmt::Write,
        timestamp: &str,
        level: &Level,
        target: &str,
        fields: &FieldVisitor,
    ) -> fmt::Result {
        let color = self.level_color(level);
        let (cyan, reset) = if self.color_enabled {
            (COLOR_CYAN, COLOR_RESET)
        } else {
            ("", "")
        };

        write!(
            writer,
            "{}[{}] [{}] [{}{}{}] {}",
            cyan,
            timestamp,
            self.component_name(fields.component.as_deref(), target),
            color,
            Self::level_label(level),
            reset,
            fields.message
        )?;
        for (key, value) in &fields.extra {
            write!(writer, " {}={}", key, value)?;
        }
        writeln!(writer, "{}", reset)
    }
}

impl<S, N> FormatEvent<S, N> for KioskLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string();

        let mut fields = FieldVisitor::default();
        event.record(&mut fields);

        let metadata = event.metadata();
        self.write_line(
            &mut writer,
            &timestamp,
            metadata.level(),
            metadata.target(),
            &fields,
        )
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    component: Option<String>,
    extra: Vec<(&'static str, String)>,
}

fn unquote(debug: String) -> String {
    if debug.len() >= 2 && debug.starts_with('"') && debug.ends_with('"') {
        debug[1..debug.len() - 1].to_string()
    } else {
        debug
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let rendered = unquote(format!("{:?}", value));
        match field.name() {
            "message" => self.message = rendered,
            "component" => self.component = Some(rendered),
            name => self.extra.push((name, rendered)),
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "component" => self.component = Some(value.to_string()),
            name => self.extra.push((name, value.to_string())),
        }
    }
}

/// Colours only on a real, non-dumb terminal
fn color_supported() -> bool {
    match std::env::var("TERM") {
        Ok(term) => term != "dumb",
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_name_sources() {
        let formatter = KioskLogFormatter::plain("kiosk");
        assert_eq!(
            formatter.component_name(Some("display"), "kiosk").trim_end(),
            "kiosk-display"
        );
        assert_eq!(
            formatter
                .component_name(None, "kiosk_session::supervisor")
                .trim_end(),
            "kiosk-session"
        );
        assert_eq!(formatter.component_name(None, "hyper").trim_end(), "kiosk");
        assert_eq!(
            formatter.component_name(None, "kiosk").chars().count(),
            COMPONENT_WIDTH
        );
    }

    #[test]
    fn test_long_component_truncated() {
        let formatter = KioskLogFormatter::plain("kiosk");
        let name = formatter.component_name(Some("presentation-layer"), "kiosk");
        assert_eq!(name.chars().count(), COMPONENT_WIDTH);
        assert!(name.ends_with('…'));
    }

    #[test]
    fn test_plain_line_layout() {
        let formatter = KioskLogFormatter::plain("kiosk");
        let fields = FieldVisitor {
            message: "Connected as lobby-1".to_string(),
            component: Some("client".to_string()),
            extra: vec![("epoch", "2".to_string())],
        };

        let mut line = String::new();
        formatter
            .write_line(
                &mut line,
                "2024-05-01 12:00:00.000",
                &Level::INFO,
                "kiosk",
                &fields,
            )
            .unwrap();

        assert!(line.starts_with("[2024-05-01 12:00:00.000] [kiosk-client"));
        assert!(line.contains("ℹ INFO"));
        assert!(line.ends_with("Connected as lobby-1 epoch=2\n"));
        assert!(!line.contains('\x1b'));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"display\"".to_string()), "display");
        assert_eq!(unquote("42".to_string()), "42");
        assert_eq!(unquote("\"".to_string()), "\"");
    }
}
