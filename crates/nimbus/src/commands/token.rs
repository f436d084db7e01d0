use colored::Colorize;
use nimbus_cloud::CloudClient;

pub async fn handle(client: &CloudClient, force: bool) -> anyhow::Result<()> {
    let executor = client.executor();
    let context = if force {
        executor.authenticate(true).await?
    } else {
        executor.ensure_session().await?
    };

    println!("{}", context.token);
    match context.expires {
        Some(expires) => eprintln!("{} {}", "expires:".dimmed(), expires.to_rfc3339()),
        None => eprintln!("{}", "expires: never (until rejected)".dimmed()),
    }
    Ok(())
}
