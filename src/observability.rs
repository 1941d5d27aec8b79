//! Logging setup: env-filtered fmt output plus an optional chrome trace.

#[cfg(feature = "trace")]
use std::sync::OnceLock;

#[cfg(feature = "trace")]
use tracing_chrome::FlushGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "execution_agent=info";

#[derive(Clone, Debug, Default)]
pub struct ObservabilityOptions {
    /// Write a chrome trace to this path (requires the `trace` feature).
    pub trace_path: Option<String>,
}

#[cfg(feature = "trace")]
static TRACE_GUARD: OnceLock<std::sync::Mutex<Option<FlushGuard>>> = OnceLock::new();

#[cfg(feature = "trace")]
fn store_trace_guard(guard: FlushGuard) {
    let cell = TRACE_GUARD.get_or_init(|| std::sync::Mutex::new(None));
    let mut slot = cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = Some(guard);
}

/// Flush and close the trace file, if one is open.
#[cfg(feature = "trace")]
pub fn flush() {
    if let Some(cell) = TRACE_GUARD.get() {
        let mut slot = cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.take();
    }
}

#[cfg(not(feature = "trace"))]
pub fn flush() {}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
#[cfg(feature = "trace")]
pub fn init(options: ObservabilityOptions) {
    let (chrome_layer, trace_guard) = match options.trace_path.clone() {
        Some(path) => {
            let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
                .file(path.clone())
                .build();
            eprintln!("tracing-chrome enabled (trace at {path})");
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(chrome_layer)
        .try_init()
    {
        eprintln!("tracing init failed: {err}");
    }

    if let Some(guard) = trace_guard {
        store_trace_guard(guard);
    }
}

#[cfg(not(feature = "trace"))]
pub fn init(options: ObservabilityOptions) {
    if options.trace_path.is_some() {
        eprintln!("chrome tracing disabled. Rebuild with --features trace to enable it.");
    }
    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("tracing init failed: {err}");
    }
}
