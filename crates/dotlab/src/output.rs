//! Coloured terminal rendering of diffs, streaming results, and reports.

use colored::Colorize;
use dotlab_classify::{Classification, VarType};
use dotlab_sync::{ApplyResult, Change, ChangeKind, SyncReport};

pub const SEPARATOR: &str =
    "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Honour `--no-color` and the `NO_COLOR` convention.
pub fn setup_color(no_color: bool) {
    if no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }
}

/// Masked values are never echoed back to the terminal.
fn display_value(value: &str, classification: Option<&Classification>) -> String {
    if classification.is_some_and(|cl| cl.masked) {
        "***".to_string()
    } else {
        value.to_string()
    }
}

/// ` [file] [masked] [protected]` suffix for a change line.
fn tags(classification: Option<&Classification>) -> String {
    let Some(cl) = classification else {
        return String::new();
    };
    let mut tags = Vec::new();
    if cl.var_type == VarType::File {
        tags.push("[file]");
    }
    if cl.masked {
        tags.push("[masked]");
    }
    if cl.protected {
        tags.push("[protected]");
    }
    if tags.is_empty() {
        String::new()
    } else {
        format!(" {}", tags.join(" "))
    }
}

/// One line per change, diff style.
pub fn print_diff(changes: &[Change]) {
    for change in changes {
        let cl = change.classification.as_ref();
        match change.kind {
            ChangeKind::Create => {
                let value = display_value(change.new_value.as_deref().unwrap_or(""), cl);
                println!(
                    "{}",
                    format!("+ {}={}{}", change.key, value, tags(cl)).green()
                );
            }
            ChangeKind::Update => {
                let old = display_value(change.old_value.as_deref().unwrap_or(""), cl);
                let new = display_value(change.new_value.as_deref().unwrap_or(""), cl);
                println!("{}", format!("~ {}: {} → {}", change.key, old, new).yellow());
            }
            ChangeKind::Delete => println!("{}", format!("- {}", change.key).red()),
            ChangeKind::Unchanged => println!("{}", format!("= {}", change.key).cyan()),
            ChangeKind::Skipped => {
                let reason = change.skip_reason.as_deref().unwrap_or("skipped");
                println!("{}", format!("⊘ {} ({})", change.key, reason).bright_black());
            }
        }
    }
}

/// Counter line shown after a diff.
pub fn print_diff_summary(changes: &[Change]) {
    let count = |kind| changes.iter().filter(|c| c.kind == kind).count();
    println!(
        "\nCreated: {} | Updated: {} | Deleted: {} | Unchanged: {} | Skipped: {}",
        count(ChangeKind::Create),
        count(ChangeKind::Update),
        count(ChangeKind::Delete),
        count(ChangeKind::Unchanged),
        count(ChangeKind::Skipped),
    );
}

/// Streaming per-result line during apply.
pub fn print_result(result: &ApplyResult) {
    let change = &result.change;
    if let Some(err) = &result.error {
        println!(
            "{}",
            format!("  ✗ Failed:    {:<30} ({err})", change.key).red()
        );
        return;
    }
    let cl = change.classification.as_ref();
    match change.kind {
        ChangeKind::Create => {
            let value = display_value(change.new_value.as_deref().unwrap_or(""), cl);
            println!(
                "{}",
                format!(
                    "  ✓ Created:   {:<30}{}",
                    format!("{}={}", change.key, value),
                    tags(cl)
                )
                .green()
            );
        }
        ChangeKind::Update => {
            println!(
                "{}",
                format!("  ↻ Updated:   {:<30}{}", change.key, tags(cl)).yellow()
            );
        }
        ChangeKind::Delete => {
            println!("{}", format!("  - Deleted:   {}", change.key).red());
        }
        // Already shown in the diff listing; stay quiet during apply.
        ChangeKind::Unchanged | ChangeKind::Skipped => {}
    }
}

/// Summary block with counters, duration, and effective request rate.
pub fn print_report(report: &SyncReport) {
    println!("\n{SEPARATOR}");
    println!(
        "  Created: {} | Updated: {} | Deleted: {} | Unchanged: {} | Skipped: {} | Failed: {}",
        report.created,
        report.updated,
        report.deleted,
        report.unchanged,
        report.skipped,
        report.failed,
    );
    println!(
        "  Duration: {:.1?} | API calls: {} | Rate: {:.1} req/s",
        report.duration,
        report.api_calls,
        report.effective_rate(),
    );
    println!("{SEPARATOR}");

    if !report.errors.is_empty() {
        println!("\nErrors:");
        for err in &report.errors {
            println!("{}", format!("  {err}").red());
        }
    }
}
