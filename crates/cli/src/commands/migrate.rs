use huddle_core::config::{AppConfig, LoadOptions};
use huddle_db::{connect_with_config, migrations};

use crate::commands::{block_on, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let outcome = block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let applied = migrations::MIGRATOR.iter().count();
        pool.close().await;
        Ok::<usize, (&'static str, String, u8)>(applied)
    });

    match outcome {
        Ok(Ok(applied)) => CommandResult::success(
            "migrate",
            format!("message store schema is current ({applied} migrations known)"),
        ),
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
        Err(message) => CommandResult::failure("migrate", "runtime_init", message, 3),
    }
}
