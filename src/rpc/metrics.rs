use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};

/// Prometheus metrics of one RPC server
pub struct RpcMetrics {
    registry: Registry,

    // Call metrics
    pub calls_total: CounterVec,

    // Task metrics
    pub tasks_submitted: IntCounter,
    pub tasks_finished: CounterVec,
    pub tasks_in_flight: Gauge,
    pub reply_duration: Histogram,

    // Agent pool
    pub hosted_agents: Gauge,
}

impl RpcMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let calls_total = CounterVec::new(
            Opts::new("troupe_rpc_calls_total", "Total number of RPC calls"),
            &["method", "status"],
        )?;
        registry.register(Box::new(calls_total.clone()))?;

        let tasks_submitted = IntCounter::new(
            "troupe_tasks_submitted_total",
            "Total reply tasks handed to the worker pool",
        )?;
        registry.register(Box::new(tasks_submitted.clone()))?;

        let tasks_finished = CounterVec::new(
            Opts::new("troupe_tasks_finished_total", "Total reply tasks finished"),
            &["outcome"],
        )?;
        registry.register(Box::new(tasks_finished.clone()))?;

        let tasks_in_flight = Gauge::new(
            "troupe_tasks_in_flight",
            "Reply tasks submitted but not finished",
        )?;
        registry.register(Box::new(tasks_in_flight.clone()))?;

        let reply_duration = Histogram::with_opts(HistogramOpts::new(
            "troupe_reply_duration_seconds",
            "Time an agent took to reply",
        ))?;
        registry.register(Box::new(reply_duration.clone()))?;

        let hosted_agents = Gauge::new("troupe_hosted_agents", "Agents hosted by this server")?;
        registry.register(Box::new(hosted_agents.clone()))?;

        Ok(Self {
            registry,
            calls_total,
            tasks_submitted,
            tasks_finished,
            tasks_in_flight,
            reply_duration,
            hosted_agents,
        })
    }

    pub fn record_call(&self, method: &str, status: &str) {
        self.calls_total.with_label_values(&[method, status]).inc();
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
