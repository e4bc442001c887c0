//! Human-readable summaries printed after `run` and `reclaim`.

use console::style;
use tubepool_store::{format_bytes, EvictionReason, ReclaimReport, RunReport};

const REASONS: [EvictionReason; 4] = [
    EvictionReason::Abandoned,
    EvictionReason::Orphaned,
    EvictionReason::AgedOut,
    EvictionReason::OverCapacity,
];

pub fn print_reclaim(report: &ReclaimReport) {
    println!();
    if report.dry_run {
        println!("  {}", style("Retention (dry run, nothing deleted)").yellow().bold());
    } else {
        println!("  {}", style("Retention").bold());
    }

    if report.deletions.is_empty() && report.failures.is_empty() {
        println!("    Pool is clean");
    }
    for reason in REASONS {
        let count = report.count(reason);
        if count > 0 {
            println!("    {:<14} {}", reason.to_string(), count);
        }
    }
    for deletion in &report.deletions {
        let name = deletion.name.to_string_lossy();
        match (&deletion.subscriber, deletion.pool_bytes_after) {
            (Some(subscriber), _) => {
                println!("      - {} ({}, {})", name, deletion.reason, subscriber)
            }
            (None, Some(after)) => {
                println!("      - {} ({}, pool now {})", name, deletion.reason, format_bytes(after))
            }
            (None, None) => println!("      - {} ({})", name, deletion.reason),
        }
    }
    for failure in &report.failures {
        println!(
            "    {} {} ({}): {}",
            style("✗").red(),
            failure.name.to_string_lossy(),
            failure.reason,
            failure.error
        );
    }
    println!("    Pool size: {}", format_bytes(report.final_bytes));
}

pub fn print_run(report: &RunReport) {
    print_reclaim(&report.reclaim);

    println!();
    println!("  {}", style("Acquisition").bold());
    println!("    {} archived", style(report.archived.len()).green());
    println!("    {} already archived", report.skipped.len());
    if report.failed.is_empty() {
        println!("    0 failed");
    } else {
        println!("    {} failed, retried next run:", style(report.failed.len()).red());
        for (id, reason) in &report.failed {
            println!("      - {}: {}", id, reason);
        }
    }
    println!();
    println!("  Run finished in {:.1}s", report.elapsed.as_secs_f64());
}
