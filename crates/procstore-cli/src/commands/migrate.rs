//! Migrate command

use super::StoreArgs;
use procstore_store::boot;
use procstore_store::repair::RepairStatus;

pub fn execute(args: StoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let env = args.environment();
    let report = boot::run_with_defaults(&env, &args.migrations)?;

    for migration in &report.migrations {
        let repository = migration
            .repository
            .map(|r| r.as_str())
            .unwrap_or("unknown");
        println!(
            "{}: {} applied, {} already applied",
            repository,
            migration.applied.len(),
            migration.skipped.len()
        );
        for unit in &migration.applied {
            println!("  + {}", unit);
        }
    }

    for repair in &report.repairs {
        let outcome = match &repair.status {
            RepairStatus::AlreadyApplied => "already applied".to_string(),
            RepairStatus::SharedStore => "skipped, stores are shared".to_string(),
            RepairStatus::Completed(summary) => format!(
                "completed ({} copied, {} updated, {} skipped)",
                summary.rows_copied, summary.rows_updated, summary.rows_skipped
            ),
            RepairStatus::Failed(err) => format!("failed, will retry next boot: {}", err),
        };
        println!("repair/{}: {}", repair.procedure, outcome);
    }

    Ok(())
}
