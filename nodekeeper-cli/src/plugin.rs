///! Plugin output conventions
///!
///! Every invocation prints exactly one status line on stdout and exits
///! with the monitoring server's plugin exit code.

/// Check result severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl CheckStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            CheckStatus::Ok => 0,
            CheckStatus::Warning => 1,
            CheckStatus::Critical => 2,
            CheckStatus::Unknown => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warning => "WARNING",
            CheckStatus::Critical => "CRITICAL",
            CheckStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Final result of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginOutput {
    pub status: CheckStatus,
    pub line: String,
}

impl PluginOutput {
    /// Check-style line: `<name> <STATUS>[: <message>]`
    pub fn check(name: &str, status: CheckStatus, message: Option<&str>) -> Self {
        let line = match message {
            Some(message) => format!("{} {}: {}", name, status.label(), message),
            None => format!("{} {}", name, status.label()),
        };
        Self { status, line }
    }

    /// Handler-style line, printed as given
    pub fn handler(status: CheckStatus, line: impl Into<String>) -> Self {
        Self {
            status,
            line: line.into(),
        }
    }

    pub fn ok(name: &str, message: Option<&str>) -> Self {
        Self::check(name, CheckStatus::Ok, message)
    }

    pub fn critical(name: &str, message: &str) -> Self {
        Self::check(name, CheckStatus::Critical, Some(message))
    }

    pub fn unknown(name: &str, message: &str) -> Self {
        Self::check(name, CheckStatus::Unknown, Some(message))
    }

    pub fn exit_code(&self) -> u8 {
        self.status.exit_code()
    }

    /// Write the status line to stdout
    pub fn print(&self) {
        println!("{}", self.line);
    }
}
