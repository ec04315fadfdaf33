use charter_core::{QueueStatus, SyncLabel};
use colored::{ColoredString, Colorize};

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

pub fn hint(msg: &str) {
    println!("{} {}", "hint:".cyan().bold(), msg.dimmed());
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Text shown next to a content item.
pub fn label_text(label: &SyncLabel) -> String {
    match label {
        SyncLabel::Private => "Private".to_string(),
        SyncLabel::Queued => "Queued".to_string(),
        SyncLabel::Syncing => "Syncing".to_string(),
        SyncLabel::NeedsAuthToSync => "Sign in to sync".to_string(),
        SyncLabel::Failed { reason: Some(reason) } => format!("Failed: {reason}"),
        SyncLabel::Failed { reason: None } => "Failed".to_string(),
        SyncLabel::SharedWithCommunity => "Shared with community".to_string(),
        SyncLabel::PublishedPublicly => "Published publicly".to_string()
    }
}

pub fn label(label: &SyncLabel) -> ColoredString {
    let text = label_text(label);
    match label {
        SyncLabel::Private => text.dimmed(),
        SyncLabel::Queued | SyncLabel::Syncing => text.yellow(),
        SyncLabel::NeedsAuthToSync => text.magenta(),
        SyncLabel::Failed { .. } => text.red(),
        SyncLabel::SharedWithCommunity | SyncLabel::PublishedPublicly => text.green()
    }
}

pub fn queue_status(status: QueueStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        QueueStatus::Pending => text.yellow(),
        QueueStatus::InFlight => text.cyan(),
        QueueStatus::Succeeded => text.green(),
        QueueStatus::Failed => text.red().bold(),
        QueueStatus::PendingAuth => text.magenta()
    }
}
