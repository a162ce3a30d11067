// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

//! Log line formatting and subscriber setup for HoneyDash tools.
//!
//! Every line carries a fixed prefix so operator output can be grepped apart
//! from whatever the honeypot processes print to the same terminal:
//!
//! ```text
//! HONEYDASH | INFO | operation completed service="cowrie" operation=start
//! HONEYDASH | DEBUG | poll{services=2}: control API request method=GET path=/cowrie/status
//! ```

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Prefix written before the level on every line.
pub const LOG_PREFIX: &str = "HONEYDASH";

/// Formats events as `HONEYDASH | LEVEL | spans: message fields`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "{LOG_PREFIX} | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                // The fmt layer stores formatted span fields on creation; a span
                // recorded by another layer may not have them.
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter for the given level with HTTP stack internals silenced.
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::new(format!("hyper=off,reqwest=off,rustls=off,{log_level}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::{info, info_span};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_lines_carry_prefix_level_and_spans() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .with_env_filter(env_filter("debug"))
            .event_format(Formatter)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let span = info_span!("poll", services = 2);
            let _guard = span.enter();
            info!(service = "cowrie", "status polled");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            output,
            "HONEYDASH | INFO | poll{services=2}: status polled service=\"cowrie\"\n"
        );
    }

    #[test]
    fn test_filter_respects_level() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .with_env_filter(env_filter("warn"))
            .event_format(Formatter)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            info!("hidden");
            tracing::warn!("shown");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output, "HONEYDASH | WARN | shown\n");
    }
}
