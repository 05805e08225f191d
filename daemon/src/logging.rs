//! Console + file log sink producing `<timestamp> - <LEVEL> - <message>` lines

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::{DefaultFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("cannot open log file {path}: {source}")]
    File {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Renders each event as one line; span context is not included.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} - {} - ",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            level_name(event.metadata().level())
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// A fmt layer that writes [`LineFormat`] lines to `writer`.
pub fn line_layer<S, W>(writer: W) -> tracing_subscriber::fmt::Layer<S, DefaultFields, LineFormat, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(LineFormat)
        .with_writer(writer)
}

/// Install the global subscriber: stdout plus an append-only file. The
/// returned guard flushes the file writer when dropped.
pub fn init(log_file: &Path) -> Result<WorkerGuard, LoggingError> {
    let file_error = |source| LoggingError::File {
        path: log_file.to_path_buf(),
        source,
    };
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(file_error)?;
    }
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_file)
        .map_err(file_error)?;

    // Block rather than drop lines when the writer falls behind
    let (file_writer, guard) = NonBlockingBuilder::default().lossy(false).finish(file);

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let subscriber = Registry::default()
        .with(filter)
        .with(line_layer(io::stdout))
        .with(line_layer(file_writer));
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}
