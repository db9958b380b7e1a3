use crate::commands::context::{execute, open_pool};
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let result = execute("migrate", |config| async move {
        let pool = open_pool(&config).await?;
        pool.close().await;
        Ok(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure,
    }
}
