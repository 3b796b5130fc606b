use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Blocking,
    Async,
}

impl ExecutionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Async => "async",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallOptions {
    timeout: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn timeout_value(&self) -> Option<Duration> {
        self.timeout
    }
}

#[derive(Debug)]
pub struct CallContext {
    options: CallOptions,
    mode: ExecutionMode,
    started_at: Instant,
    try_count: AtomicUsize,
}

impl CallContext {
    pub(crate) fn new(options: CallOptions, mode: ExecutionMode) -> Self {
        Self {
            options,
            mode,
            started_at: Instant::now(),
            try_count: AtomicUsize::new(0),
        }
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn try_count(&self) -> usize {
        self.try_count.load(Ordering::Acquire)
    }

    pub(crate) fn begin_try(&self) -> usize {
        self.try_count.fetch_add(1, Ordering::AcqRel) + 1
    }
}
