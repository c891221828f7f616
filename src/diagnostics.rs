//! Per-resonator diagnostics sink.
//!
//! Components never write to a process-wide logger of their own. They take a `&mut Diagnostics`
//! which keeps every message (so the orchestrator can report them with the resonator's output)
//! and forwards it to `tracing` tagged with the resonator id.
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Debug,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    kid_id: Option<usize>,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    /// A sink whose messages identify the resonator `kid_id`
    pub fn for_kid(kid_id: usize) -> Diagnostics {
        Diagnostics {
            kid_id: Some(kid_id),
            entries: vec![],
        }
    }

    pub fn kid_id(&self) -> Option<usize> {
        self.kid_id
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(Severity::Debug, message.into());
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into());
    }

    fn push(&mut self, severity: Severity, message: String) {
        match (severity, self.kid_id) {
            (Severity::Debug, Some(kid)) => tracing::debug!(kid = kid, "{message}"),
            (Severity::Debug, None) => tracing::debug!("{message}"),
            (Severity::Info, Some(kid)) => tracing::info!(kid = kid, "{message}"),
            (Severity::Info, None) => tracing::info!("{message}"),
            (Severity::Warning, Some(kid)) => tracing::warn!(kid = kid, "KID ID {kid}: {message}"),
            (Severity::Warning, None) => tracing::warn!("{message}"),
        }
        self.entries.push(Diagnostic { severity, message });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// True if any recorded message contains `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        self.entries.iter().any(|d| d.message.contains(needle))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order_with_severity() {
        let mut diag = Diagnostics::for_kid(7);
        diag.debug("first");
        diag.warn("second");
        assert_eq!(diag.kid_id(), Some(7));
        assert_eq!(diag.entries().len(), 2);
        assert_eq!(diag.entries()[0].severity, Severity::Debug);
        assert_eq!(diag.warnings().count(), 1);
        assert!(diag.mentions("second"));
        assert!(!diag.mentions("third"));
    }
}
