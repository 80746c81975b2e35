//! Service configuration (ambient stack): a builder in the shape of the
//! teacher's `QosPolicyBuilder` — construct, set what you need, `.build()`.
//! File-based config parsing is out of scope (spec.md §1).

#[derive(Debug, Clone)]
pub struct MsgServiceConfig {
    pub node_id: u32,
    pub handle_table_initial_capacity: usize,
    pub default_size_limits: [usize; 4],
    pub default_retention_time_nanos: u64,
}

impl Default for MsgServiceConfig {
    fn default() -> Self {
        MsgServiceConfig {
            node_id: 0,
            handle_table_initial_capacity: 64,
            default_size_limits: [1 << 20; 4], // 1 MiB per priority, advisory
            default_retention_time_nanos: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MsgServiceConfigBuilder {
    config: MsgServiceConfig,
}

impl MsgServiceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_id(mut self, node_id: u32) -> Self {
        self.config.node_id = node_id;
        self
    }

    pub fn handle_table_initial_capacity(mut self, capacity: usize) -> Self {
        self.config.handle_table_initial_capacity = capacity;
        self
    }

    pub fn default_size_limits(mut self, limits: [usize; 4]) -> Self {
        self.config.default_size_limits = limits;
        self
    }

    pub fn default_retention_time_nanos(mut self, nanos: u64) -> Self {
        self.config.default_retention_time_nanos = nanos;
        self
    }

    pub fn build(self) -> MsgServiceConfig {
        self.config
    }
}
