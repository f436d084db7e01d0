use colored::Colorize;
use nimbus_cloud::{CloudClient, CloudError, TaskFormat};
use std::time::Duration;

pub async fn handle(
    client: &CloudClient,
    task_ref: &str,
    timeout: Duration,
    interval: Duration,
    format: &str,
) -> anyhow::Result<()> {
    let format: TaskFormat = format.parse()?;
    println!("{} {}", "Waiting for task".blue(), task_ref.cyan());

    match client.waiter(format).wait(task_ref, timeout, interval).await {
        Ok(task) => {
            println!(
                "{} after {} polls",
                "✓ Task completed".green(),
                task.polls
            );
            Ok(())
        }
        Err(err @ CloudError::Task { .. }) => {
            println!("{} {}", "✗ Task failed:".red(), err.task_message().unwrap_or_default());
            Err(err.into())
        }
        Err(err @ CloudError::TaskCanceled { .. }) => {
            println!("{}", "✗ Task was canceled".yellow());
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}
