use std::fmt;

/// What a verification pass may do besides reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Treatment {
    /// Repair what can be repaired.
    pub correct: bool,
    /// Keep going after an inconsistency instead of stopping at the first one.
    pub continue_on_error: bool,
    /// Also verify the physical files underneath.
    pub cascade: bool,
}

impl Treatment {
    pub const REPORT: Treatment = Treatment {
        correct: false,
        continue_on_error: true,
        cascade: true,
    };

    pub const CORRECT: Treatment = Treatment {
        correct: true,
        continue_on_error: true,
        cascade: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Corrected,
    Correctable,
    Inconsistent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.subject, self.message)
    }
}

/// Findings accumulated over a verification run.
#[derive(Debug, Default, Clone)]
pub struct Progress {
    findings: Vec<Finding>,
}

impl Progress {
    pub fn report(
        &mut self,
        severity: Severity,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        let finding = Finding {
            severity,
            subject: subject.into(),
            message: message.into(),
        };
        match severity {
            Severity::Corrected => tracing::info!(%finding, "verification"),
            Severity::Correctable | Severity::Inconsistent => {
                tracing::warn!(%finding, "verification")
            }
        }
        self.findings.push(finding);
    }

    /// True while nothing uncorrected has been found.
    pub fn is_good(&self) -> bool {
        self.findings
            .iter()
            .all(|f| f.severity == Severity::Corrected)
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    pub fn merge(&mut self, other: Progress) {
        self.findings.extend(other.findings);
    }
}
