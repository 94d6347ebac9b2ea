use std::fmt;

use thiserror::Error;

/// Failure classification shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Api,
    Validation,
    Execution,
    Database,
    InsufficientFunds,
    CircuitBreaker,
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Api => "API",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Execution => "EXECUTION",
            ErrorKind::Database => "DATABASE",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::CircuitBreaker => "CIRCUIT_BREAKER",
            ErrorKind::Configuration => "CONFIGURATION",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// What the caller should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    Retry,
    CircuitBreak,
    Skip,
    Shutdown,
}

/// Classified failure value carried through the pipeline.
///
/// Each kind has fixed retryability/severity defaults; constructors below
/// apply them. `classify` promotes opaque errors via message heuristics.
#[derive(Debug, Clone, Error)]
#[error("[{kind}/{code}] {message}")]
pub struct BotError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub severity: Severity,
}

impl BotError {
    fn build(
        kind: ErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
        severity: Severity,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            retryable,
            severity,
        }
    }

    pub fn network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Network, code, message, true, Severity::Medium)
    }

    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Api, code, message, true, Severity::Medium)
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Validation, code, message, false, Severity::High)
    }

    pub fn execution(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Execution, code, message, false, Severity::High)
    }

    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Database, code, message, true, Severity::High)
    }

    pub fn insufficient_funds(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::InsufficientFunds,
            code,
            message,
            false,
            Severity::Critical,
        )
    }

    pub fn circuit_breaker(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::CircuitBreaker, code, message, true, Severity::High)
    }

    pub fn configuration(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::Configuration,
            code,
            message,
            false,
            Severity::Critical,
        )
    }

    /// Override the retryability default (e.g. a 4xx API response).
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Promote an arbitrary failure to a typed error.
    ///
    /// Already-typed `BotError`s pass through unchanged. Everything else is
    /// classified by message substrings — a legacy shim for third-party
    /// errors that cannot carry a kind. First matching rule wins; anything
    /// unmatched lands on non-retryable EXECUTION.
    pub fn classify(err: anyhow::Error) -> Self {
        let err = match err.downcast::<BotError>() {
            Ok(typed) => return typed,
            Err(other) => other,
        };

        let msg = format!("{err:#}");
        let lower = msg.to_lowercase();

        // Rules fire in order; "connection failed" is ambiguous with the
        // database rule below and lands on NETWORK because that rule runs
        // first.
        if ["timeout", "network", "connection", "enotfound", "econnrefused"]
            .iter()
            .any(|t| lower.contains(t))
        {
            return Self::network("NET_CLASSIFIED", msg);
        }
        if lower.contains("mongo")
            || lower.contains("database")
            || (lower.contains("connection") && lower.contains("failed"))
        {
            return Self::database("DB_CLASSIFIED", msg);
        }
        if lower.contains("api")
            || lower.contains("http")
            || (lower.contains("request") && lower.contains("failed"))
        {
            return Self::api("API_CLASSIFIED", msg);
        }
        if lower.contains("insufficient") && lower.contains("balance") {
            return Self::insufficient_funds("FUNDS_CLASSIFIED", msg);
        }
        if lower.contains("validation") || lower.contains("invalid") {
            return Self::validation("VALIDATION_CLASSIFIED", msg);
        }

        Self::execution("EXEC_CLASSIFIED", msg)
    }

    /// Pick a recovery strategy from kind and severity.
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self.kind {
            ErrorKind::Network | ErrorKind::Api => RecoveryStrategy::Retry,
            ErrorKind::Database => RecoveryStrategy::CircuitBreak,
            _ if !self.retryable && self.severity == Severity::Critical => {
                RecoveryStrategy::Shutdown
            }
            _ => RecoveryStrategy::Skip,
        }
    }

    /// Structured log line for a classified error. Retryable failures mid-retry
    /// log at warn; everything else at error.
    pub fn log(&self, context: &str, terminal: bool) {
        if self.retryable && !terminal {
            tracing::warn!(
                code = %self.code,
                kind = %self.kind,
                severity = %self.severity,
                retryable = self.retryable,
                context,
                "{}", self.message
            );
        } else {
            tracing::error!(
                code = %self.code,
                kind = %self.kind,
                severity = %self.severity,
                retryable = self.retryable,
                context,
                "{}", self.message
            );
        }
    }
}

pub type BotResult<T> = Result<T, BotError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
