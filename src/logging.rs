//! Tracing subscriber setup: env filter, stderr output kept clear of the progress bar.

use anyhow::Context as _;
use indicatif::ProgressBar;
use std::io::{self, Write};
use tracing_subscriber::fmt::MakeWriter;

/// Default filter directive for the given verbosity. `RUST_LOG` takes precedence.
pub fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "serialscrape=debug,info"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Writer factory that buffers one event and emits it with the progress bar suspended, so log
/// lines and the bar never share a terminal line.
pub struct ProgressAwareWriter<M> {
    bar: Option<ProgressBar>,
    inner: M,
}

impl<M> ProgressAwareWriter<M> {
    pub fn new(bar: Option<ProgressBar>, inner: M) -> Self {
        Self { bar, inner }
    }
}

impl<'a, M> MakeWriter<'a> for ProgressAwareWriter<M>
where
    M: MakeWriter<'a> + 'a,
{
    type Writer = EventWriter<'a, M>;

    fn make_writer(&'a self) -> Self::Writer {
        EventWriter {
            bar: self.bar.as_ref(),
            inner: &self.inner,
            buf: Vec::new(),
        }
    }
}

/// One formatted event; flushed to the inner writer on drop.
pub struct EventWriter<'a, M: MakeWriter<'a>> {
    bar: Option<&'a ProgressBar>,
    inner: &'a M,
    buf: Vec<u8>,
}

impl<'a, M: MakeWriter<'a>> Write for EventWriter<'a, M> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a, M: MakeWriter<'a>> Drop for EventWriter<'a, M> {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let emit = || {
            let mut out = self.inner.make_writer();
            let _ = out.write_all(&self.buf);
            let _ = out.flush();
        };
        match self.bar {
            Some(bar) => bar.suspend(emit),
            None => emit(),
        }
    }
}

/// Install the global subscriber. Pass the console progress bar, if any, so log lines do not
/// tear through it.
pub fn init(verbose: bool, quiet: bool, bar: Option<ProgressBar>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_directive(verbose, quiet)))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(ProgressAwareWriter::new(bar, io::stderr))
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
