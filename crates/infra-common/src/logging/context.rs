use std::collections::HashMap;
use std::fmt;
use tracing::{Level, Span};

/// Context information for logging
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component that is generating the log
    pub component: String,
    /// Operation or action being performed
    pub operation: Option<String>,
    /// Additional contextual fields
    pub fields: HashMap<String, String>,
}

impl LogContext {
    /// Create a new log context with just the component name
    pub fn new<S: Into<String>>(component: S) -> Self {
        LogContext {
            component: component.into(),
            operation: None,
            fields: HashMap::new(),
        }
    }

    /// Create a new log context with component and operation
    pub fn with_operation<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        LogContext {
            component: component.into(),
            operation: Some(operation.into()),
            fields: HashMap::new(),
        }
    }

    /// Add a field to the context
    pub fn with_field<S: Into<String>, T: Into<String>>(mut self, key: S, value: T) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Create a span with this context's information
    pub fn span(&self, level: Level) -> Span {
        match level {
            Level::TRACE => {
                if let Some(op) = &self.operation {
                    tracing::trace_span!("webcall", component = %self.component, operation = %op)
                } else {
                    tracing::trace_span!("webcall", component = %self.component)
                }
            }
            Level::DEBUG => {
                if let Some(op) = &self.operation {
                    tracing::debug_span!("webcall", component = %self.component, operation = %op)
                } else {
                    tracing::debug_span!("webcall", component = %self.component)
                }
            }
            Level::INFO => {
                if let Some(op) = &self.operation {
                    tracing::info_span!("webcall", component = %self.component, operation = %op)
                } else {
                    tracing::info_span!("webcall", component = %self.component)
                }
            }
            Level::WARN => {
                if let Some(op) = &self.operation {
                    tracing::warn_span!("webcall", component = %self.component, operation = %op)
                } else {
                    tracing::warn_span!("webcall", component = %self.component)
                }
            }
            Level::ERROR => {
                if let Some(op) = &self.operation {
                    tracing::error_span!("webcall", component = %self.component, operation = %op)
                } else {
                    tracing::error_span!("webcall", component = %self.component)
                }
            }
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.component)?;

        if let Some(op) = &self.operation {
            write!(f, "[{}]", op)?;
        }

        for (key, value) in &self.fields {
            write!(f, "[{}={}]", key, value)?;
        }

        Ok(())
    }
}

/// Enter a logging context for the duration of a closure
pub fn with_context<F, R>(context: &LogContext, level: Level, f: F) -> R
where
    F: FnOnce() -> R,
{
    let span = context.span(level);
    let _guard = span.enter();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let ctx = LogContext::with_operation("pbx-bridge", "apply-event")
            .with_field("session", "s1");
        let shown = format!("{}", ctx);
        assert!(shown.starts_with("[pbx-bridge][apply-event]"));
        assert!(shown.contains("[session=s1]"));
    }

    #[test]
    fn with_context_returns_closure_value() {
        let ctx = LogContext::new("test");
        let value = with_context(&ctx, Level::DEBUG, || 42);
        assert_eq!(value, 42);
    }
}
