//! Runtime configuration

/// Configuration shared by the registry and every execution context.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum number of live guilds, main included
    pub max_live_guilds: usize,

    /// Stack size for guild threads; platform default when `None`
    pub stack_size: Option<usize>,

    /// Prefix for guild thread names (`<prefix>-<id>`)
    pub thread_name_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_live_guilds: 4096,
            stack_size: None,
            thread_name_prefix: "guild".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with a custom live-guild limit.
    pub fn with_max_live_guilds(max: usize) -> Self {
        Self {
            max_live_guilds: max,
            ..Default::default()
        }
    }

    /// Set the guild thread stack size.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Set the guild thread name prefix.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}
