use std::collections::BTreeMap;
use tracing::Level;

/// Context attached to every message of a [`StructuredLogger`]
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "station", "dispatcher", "web")
    pub component: String,
    /// Station the messages relate to
    pub station: Option<String>,
    /// Request id for correlating an action across components
    pub request_id: Option<String>,
    /// Additional context fields
    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            station: None,
            request_id: None,
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn with_station(mut self, station: &str) -> Self {
        self.station = Some(station.to_string());
        self
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add extra field
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }
}

// tracing needs the level as a constant at each call site
macro_rules! emit {
    ($level:expr, $ctx:expr, $extra:expr, $message:expr) => {
        tracing::event!(
            $level,
            component = %$ctx.component,
            station = $ctx.station.as_deref().unwrap_or("-"),
            request_id = $ctx.request_id.as_deref().unwrap_or("-"),
            extra = %$extra,
            "{}",
            $message
        )
    };
}

/// Logger that stamps component, station and request id on every event
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context: LogContext,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    /// Same context, tagged with `request_id`
    pub fn for_request(&self, request_id: &str) -> Self {
        Self::new(self.context.clone().with_request_id(request_id.to_string()))
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn log(&self, level: Level, message: &str) {
        let ctx = &self.context;
        let extra = self.extra();
        match level {
            Level::ERROR => emit!(Level::ERROR, ctx, extra, message),
            Level::WARN => emit!(Level::WARN, ctx, extra, message),
            Level::INFO => emit!(Level::INFO, ctx, extra, message),
            Level::DEBUG => emit!(Level::DEBUG, ctx, extra, message),
            Level::TRACE => emit!(Level::TRACE, ctx, extra, message),
        }
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    pub fn trace(&self, message: &str) {
        self.log(Level::TRACE, message);
    }

    /// Extra fields as `k=v` pairs, in key order
    pub(crate) fn extra(&self) -> String {
        self.context
            .extra_fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_logger_keeps_station_context() {
        let logger = get_logger_with_context(
            LogContext::new("station")
                .with_station("garage")
                .with_field("transport", "udp".to_string())
                .with_field("phase", "3".to_string()),
        )
        .for_request("r-1");
        let ctx = logger.context();
        assert_eq!(ctx.station.as_deref(), Some("garage"));
        assert_eq!(ctx.request_id.as_deref(), Some("r-1"));
        assert_eq!(logger.extra(), "phase=3,transport=udp");
    }
}
