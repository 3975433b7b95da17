//! Structured device notations and the sinks that receive them.
//!
//! Every device and the supervisor hold a [`Telemetry`] handle given at
//! construction. The handle forwards [`Notation`]s to a [`NotationSink`];
//! the kernel never decides how notations are formatted or stored.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// One structured log record.
#[derive(Clone, Debug, PartialEq)]
pub struct Notation {
    /// Local time of the emitting device, in seconds.
    pub time: f64,
    pub device_id: String,
    pub tag: String,
    pub message: String,
    pub value: Option<f64>,
}

impl fmt::Display for Notation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>10.3}s {} [{}] {}",
            self.time, self.device_id, self.tag, self.message
        )?;
        if let Some(value) = self.value {
            write!(f, " ({value})")?;
        }
        Ok(())
    }
}

/// Destination for notations.
pub trait NotationSink: Send + Sync {
    fn record(&self, notation: Notation);
}

/// Emits each notation as a `tracing` event on the `lpdm` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotationSink for TracingSink {
    fn record(&self, notation: Notation) {
        tracing::info!(
            target: "lpdm",
            time = notation.time,
            device = %notation.device_id,
            tag = %notation.tag,
            value = ?notation.value,
            "{}",
            notation.message
        );
    }
}

/// Keeps notations in memory, optionally forwarding them to `tracing` too.
#[derive(Debug, Default)]
pub struct MemorySink {
    notations: Mutex<Vec<Notation>>,
    forward: bool,
}

impl MemorySink {
    /// Creates a sink that only collects.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that collects and also forwards to [`TracingSink`].
    pub fn forwarding() -> Self {
        Self {
            notations: Mutex::new(Vec::new()),
            forward: true,
        }
    }

    /// Returns a copy of everything recorded so far.
    pub fn notations(&self) -> Vec<Notation> {
        self.lock().clone()
    }

    /// Returns recorded notations with the given tag.
    pub fn with_tag(&self, tag: &str) -> Vec<Notation> {
        self.lock()
            .iter()
            .filter(|n| n.tag == tag)
            .cloned()
            .collect()
    }

    /// Drains and returns everything recorded so far.
    pub fn take(&self) -> Vec<Notation> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notation>> {
        self.notations.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NotationSink for MemorySink {
    fn record(&self, notation: Notation) {
        if self.forward {
            TracingSink.record(notation.clone());
        }
        self.lock().push(notation);
    }
}

/// Cloneable handle to a notation sink, scoped to one simulation run.
#[derive(Clone)]
pub struct Telemetry {
    sink: Arc<dyn NotationSink>,
}

impl Telemetry {
    /// Wraps an existing sink.
    pub fn new(sink: Arc<dyn NotationSink>) -> Self {
        Self { sink }
    }

    /// Handle that emits to `tracing`.
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// Handle backed by a fresh [`MemorySink`], returned alongside it.
    pub fn memory() -> (Self, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Self::new(sink.clone()), sink)
    }

    /// Records a notation.
    pub fn record(
        &self,
        time: f64,
        device_id: &str,
        tag: &str,
        message: impl Into<String>,
        value: Option<f64>,
    ) {
        self.sink.record(Notation {
            time,
            device_id: device_id.to_string(),
            tag: tag.to_string(),
            message: message.into(),
            value,
        });
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}
