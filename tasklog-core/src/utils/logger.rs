use crate::config::{parse_level, LoggingConfig, TASK_LOGGER};
use crate::context::{TaskInstance, TemplateContext};
use crate::formatter::level_name;
use crate::template::PrefixTemplate;
use anyhow::{Context as _, Result};
use chrono::{DateTime, FixedOffset, Local};
use nu_ansi_term::{Color, Style};
use std::collections::BTreeMap;
use std::fmt;
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Span, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, MakeWriter},
    layer::Context,
    prelude::*,
    registry::LookupSpan,
    EnvFilter, Layer,
};

/// Name of the span that carries a task run's identity.
pub const TASK_SPAN: &str = "task_run";

/// Span for one task run. Events inside it get the task prefix.
pub fn task_span(ti: &TaskInstance) -> Span {
    tracing::info_span!(
        target: TASK_LOGGER,
        "task_run",
        dag_id = ti.dag_id(),
        task_id = ti.task_id(),
        run_id = ti.run_id(),
        try_number = ti.try_number(),
        map_index = ti.map_index(),
        logical_date = %ti.logical_date().to_rfc3339(),
    )
}

/// Console + hourly rolling file subscriber. The returned guard must be
/// kept alive by the caller or buffered file lines are lost.
pub fn setup_logger(config: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all("logs").ok();
    let template = config
        .prefix_template()
        .map(PrefixTemplate::parse)
        .transpose()
        .context("Invalid task_log_prefix_template")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "tasks");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(TaskPrefixFormatter::new(template.clone()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TaskPrefixFormatter::new(template).with_ansi(true));

    let level = parse_level(&config.logging.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    tracing_subscriber::registry()
        .with(filter)
        .with(TaskContextLayer)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to set global subscriber")?;

    Ok(guard)
}

/// Subscriber writing prefixed task logs to `writer`. Meant for scoped use
/// with `tracing::subscriber::with_default`.
pub fn task_subscriber<W>(
    template: Option<PrefixTemplate>,
    writer: W,
) -> impl Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::registry().with(TaskContextLayer).with(
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .event_format(TaskPrefixFormatter::new(template)),
    )
}

// --- Span context ---

/// Fields recorded on a `task_run` span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSpanFields {
    values: BTreeMap<&'static str, String>,
}

impl TaskSpanFields {
    pub fn get(&self, field: &str) -> Option<&str> {
        let field = match field {
            "execution_date" => "logical_date",
            other => other,
        };
        self.values.get(field).map(String::as_str)
    }

    fn logical_date(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.get("logical_date")?).ok()
    }
}

impl TemplateContext for TaskSpanFields {
    fn lookup(&self, path: &str) -> Option<String> {
        match path.split_once('.') {
            Some(("ti" | "task_instance", field)) => self.get(field).map(str::to_string),
            Some(_) => None,
            None => match path {
                "ds" => self
                    .logical_date()
                    .map(|date| date.format("%Y-%m-%d").to_string()),
                "ts" => self.get("logical_date").map(str::to_string),
                other => self.get(other).map(str::to_string),
            },
        }
    }
}

impl tracing::field::Visit for TaskSpanFields {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        self.values.insert(field.name(), format!("{:?}", value));
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.values.insert(field.name(), value.to_string());
    }
    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.values.insert(field.name(), value.to_string());
    }
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.values.insert(field.name(), value.to_string());
    }
}

/// Stores the fields of every `task_run` span in its extensions so the
/// formatter can resolve the prefix per event.
pub struct TaskContextLayer;

impl<S> Layer<S> for TaskContextLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != TASK_SPAN {
            return;
        }
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = TaskSpanFields::default();
        attrs.record(&mut fields);
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<TaskSpanFields>() {
            values.record(fields);
        }
    }
}

// --- Formatters ---

struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// Writes `<prefix>:<timestamp> [<LEVEL>] <message>`.
///
/// The prefix is rendered from the innermost `task_run` span in scope.
/// Events outside a task span, or whose span cannot resolve the template,
/// are written without a prefix.
pub struct TaskPrefixFormatter {
    template: Option<PrefixTemplate>,
    ansi: bool,
}

impl TaskPrefixFormatter {
    pub fn new(template: Option<PrefixTemplate>) -> Self {
        Self {
            template: template.filter(|t| !t.is_empty()),
            ansi: false,
        }
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    fn prefix<S, N>(&self, ctx: &FmtContext<'_, S, N>) -> Option<String>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        N: for<'a> FormatFields<'a> + 'static,
    {
        let template = self.template.as_ref()?;
        let scope = ctx.event_scope()?;
        for span in scope {
            let extensions = span.extensions();
            if let Some(fields) = extensions.get::<TaskSpanFields>() {
                return template.render(fields).ok();
            }
        }
        None
    }

    fn level(&self, level: &Level) -> String {
        let name = level_name(level);
        if !self.ansi {
            return name.to_string();
        }
        let style = match *level {
            Level::ERROR => Style::new().fg(Color::LightRed).bold(),
            Level::WARN => Style::new().fg(Color::Yellow).bold(),
            Level::INFO => Style::new().fg(Color::LightGreen),
            _ => Style::new().dimmed(),
        };
        style.paint(name).to_string()
    }
}

impl<S, N> FormatEvent<S, N> for TaskPrefixFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        if let Some(prefix) = self.prefix(ctx) {
            write!(writer, "{}:", prefix)?;
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        write!(
            writer,
            "{} [{}] ",
            timestamp,
            self.level(event.metadata().level())
        )?;

        let mut msg_visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut msg_visitor);
        writeln!(writer, "{}", msg_visitor.message)
    }
}
