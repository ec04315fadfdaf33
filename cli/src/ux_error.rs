use colored::Colorize;

#[derive(Debug)]
pub struct UxError {
    pub what: String,
    pub why: Option<String>,
    pub how_to_fix: Vec<String>,
    pub suggested_command: Option<String>
}

impl UxError {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            why: None,
            how_to_fix: Vec::new(),
            suggested_command: None
        }
    }

    pub fn why(mut self, reason: impl Into<String>) -> Self {
        self.why = Some(reason.into());
        self
    }

    pub fn fix(mut self, suggestion: impl Into<String>) -> Self {
        self.how_to_fix.push(suggestion.into());
        self
    }

    pub fn suggest(mut self, cmd: impl Into<String>) -> Self {
        self.suggested_command = Some(cmd.into());
        self
    }

    pub fn display(&self) {
        eprintln!();
        eprintln!("{} {}", "error:".red().bold(), self.what.white().bold());

        if let Some(why) = &self.why {
            eprintln!("       {}", why.dimmed());
        }

        if !self.how_to_fix.is_empty() {
            eprintln!();
            eprintln!("{}", "How to fix:".yellow().bold());
            for (i, fix) in self.how_to_fix.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, fix);
            }
        }

        if let Some(cmd) = &self.suggested_command {
            eprintln!();
            eprintln!("{}", "Try this:".green().bold());
            eprintln!("  $ {}", cmd.cyan());
        }
        eprintln!();
    }
}

impl std::fmt::Display for UxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.what)
    }
}

impl std::error::Error for UxError {}

pub fn config_error(source: &str, message: &str) -> UxError {
    UxError::new(format!("Invalid configuration from {}", source))
        .why(message.to_string())
        .fix("Check the config file for typos and out-of-range values")
        .fix("Unset CS_* environment variables you did not mean to set")
}

pub fn store_unavailable(path: &str, reason: &str) -> UxError {
    UxError::new(format!("Cannot open sync store at '{}'", path))
        .why(reason.to_string())
        .fix("Check that the directory exists and is writable")
        .fix("Point CS_DATABASE_PATH or --database at another location")
}

pub fn invalid_item_id(raw: &str) -> UxError {
    UxError::new(format!("'{}' is not a valid queue item id", raw))
        .why("Queue item ids are UUIDs")
        .suggest("charter-sync queue --status failed")
}

pub fn item_not_retriable(id: &str, status: &str) -> UxError {
    UxError::new(format!("Queue item {} is {}", id, status))
        .why("Only failed items can be retried by hand")
        .fix("Pending and held items are retried automatically")
        .suggest("charter-sync queue --status failed")
}

pub fn not_signed_in(token_var: &str) -> UxError {
    UxError::new("No credential available")
        .why("Remote calls need a bearer token")
        .fix(format!("Export {} with a valid token", token_var))
}

pub fn remote_unreachable(base_url: &str, reason: &str) -> UxError {
    UxError::new(format!("Cannot reach remote content service at {}", base_url))
        .why(reason.to_string())
        .fix("Check your network connection")
        .fix("Verify CS_REMOTE_BASE_URL")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ux_error_builder_chain() {
        let err = UxError::new("Something failed")
            .why("Because reasons")
            .fix("Try this")
            .fix("Or that")
            .suggest("charter-sync status");

        assert_eq!(err.why, Some("Because reasons".to_string()));
        assert_eq!(err.how_to_fix.len(), 2);
        assert_eq!(err.suggested_command, Some("charter-sync status".to_string()));
    }

    #[test]
    fn test_ux_error_display() {
        let err = UxError::new("Display test");
        assert_eq!(format!("{}", err), "Display test");
    }

    #[test]
    fn test_invalid_item_id() {
        let err = invalid_item_id("abc");
        assert!(err.what.contains("'abc'"));
        assert!(err.suggested_command.unwrap().contains("queue"));
    }

    #[test]
    fn test_item_not_retriable() {
        let err = item_not_retriable("42", "pending");
        assert!(err.what.contains("is pending"));
        assert!(!err.how_to_fix.is_empty());
    }

    #[test]
    fn test_not_signed_in_names_variable() {
        let err = not_signed_in("CS_REMOTE_TOKEN");
        assert!(err.how_to_fix[0].contains("CS_REMOTE_TOKEN"));
    }

    #[test]
    fn test_config_error() {
        let err = config_error("file", "log_level: Invalid log level");
        assert!(err.what.contains("from file"));
        assert!(err.why.unwrap().contains("log_level"));
    }
}
