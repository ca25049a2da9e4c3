//! Configuration for the coalescer.

use std::time::Duration;

/// Configuration for a [`Coalescer`](crate::Coalescer).
#[derive(Debug, Clone)]
pub struct CoalesceConfig {
    pub(crate) name: String,
    /// How long the owner waits before fetching, so near-simultaneous
    /// callers land on the same fetch.
    pub(crate) window: Duration,
}

impl CoalesceConfig {
    pub fn builder() -> CoalesceConfigBuilder {
        CoalesceConfigBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        CoalesceConfigBuilder::new().build()
    }
}

/// Builder for coalesce configuration.
#[derive(Debug, Clone)]
pub struct CoalesceConfigBuilder {
    name: String,
    window: Duration,
}

impl CoalesceConfigBuilder {
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            window: Duration::from_millis(50),
        }
    }

    /// Set a name for this coalescer (for metrics/tracing).
    ///
    /// ```rust
    /// use fetchguard_coalesce::CoalesceConfig;
    ///
    /// let config = CoalesceConfig::builder().name("quotes").build();
    /// assert_eq!(config.name(), "quotes");
    /// ```
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Delay between registering a fetch and starting it.
    ///
    /// Default: 50 ms. Zero starts the fetch at once.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn build(self) -> CoalesceConfig {
        CoalesceConfig {
            name: self.name,
            window: self.window,
        }
    }
}

impl Default for CoalesceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
