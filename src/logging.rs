use error_stack::{Result, ResultExt};
use thiserror::Error;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{Compact, Format, Full, Pretty, Writer};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{Logging, LoggingStyle};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

#[derive(Debug, Error)]
#[error("Could not initialize logging")]
pub struct InitError;

/// Installs the global tracing subscriber described by `cfg`.
pub fn init(cfg: &Logging) -> Result<(), InitError> {
    let filter = EnvFilter::try_new(&cfg.filter)
        .change_context(InitError)
        .attach_printable_lazy(|| format!("invalid logging filter {:?}", cfg.filter))?;

    let ansi = std::env::var_os("NO_COLOR").is_none();
    let text = Formatter::from_style(cfg.style, ansi).map(|formatter| {
        fmt::layer()
            .with_ansi(ansi)
            .event_format(formatter)
    });

    let json = (cfg.style == LoggingStyle::JSON).then(|| {
        fmt::layer()
            .json()
            .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .change_context(InitError)
        .attach_printable("a global subscriber is already set")
}

pub enum Formatter {
    Full(Format<Full, ChronoUtc>),
    Pretty(Format<Pretty, ChronoUtc>),
    Compact(Format<Compact, ChronoUtc>),
}

impl Formatter {
    /// Returns `None` for [`LoggingStyle::JSON`], which has its own layer.
    #[must_use]
    pub fn from_style(style: LoggingStyle, ansi: bool) -> Option<Self> {
        let default = fmt::format().with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string()));
        match style {
            LoggingStyle::Compact => Some(Self::Compact(default.compact().with_ansi(ansi))),
            LoggingStyle::Full => Some(Self::Full(default.with_ansi(ansi))),
            LoggingStyle::Pretty => Some(Self::Pretty(default.pretty().with_ansi(ansi))),
            LoggingStyle::JSON => None,
        }
    }
}

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        match self {
            Formatter::Full(fmt) => fmt.format_event(ctx, writer, event),
            Formatter::Pretty(fmt) => fmt.format_event(ctx, writer, event),
            Formatter::Compact(fmt) => fmt.format_event(ctx, writer, event),
        }
    }
}
