use std::time::Instant;

/// Logs the wall time of a scope when dropped. With a count attached, the
/// log line also reports how many items the scope processed.
pub struct ScopedTimer {
    name: &'static str,
    start: Instant,
    items: Option<usize>,
    level: log::Level,
}

impl ScopedTimer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
            items: None,
            level: log::Level::Info,
        }
    }

    pub fn with_items(mut self, items: usize) -> Self {
        self.items = Some(items);
        self
    }

    /// For timers on hot paths that should stay quiet at `info`.
    pub fn at(mut self, level: log::Level) -> Self {
        self.level = level;
        self
    }

    pub fn set_items(&mut self, items: usize) {
        self.items = Some(items);
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        match self.items {
            Some(n) => log::log!(self.level, "{} took {:?} ({} items)", self.name, elapsed, n),
            None => log::log!(self.level, "{} took {:?}", self.name, elapsed),
        }
    }
}
