//! Status command

use super::StoreArgs;
use procstore_store::boot::{self, BootConfig};
use procstore_store::migrations::UnitState;
use procstore_store::ConnectionManager;

pub fn execute(args: StoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = BootConfig {
        migrations_root: args.migrations.clone(),
        settings: args.environment().load()?,
    };

    let mut connections = ConnectionManager::default();
    let inspected = boot::inspect(&config, &mut connections);
    connections.close_all()?;

    for (target, units) in inspected? {
        println!("{} ({})", target.repository, target.descriptor);
        if units.is_empty() {
            println!("  no units");
        }
        for unit in units {
            match unit.state {
                UnitState::Applied => println!(
                    "  applied  {} at {}",
                    unit.id,
                    unit.applied_at.as_deref().unwrap_or("?")
                ),
                _ => println!("  pending  {}", unit.id),
            }
        }
    }
    Ok(())
}
