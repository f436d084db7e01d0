use colored::Colorize;
use nimbus_cloud::CloudClient;

pub async fn handle(client: &CloudClient) -> anyhow::Result<()> {
    let catalog = client.executor().catalog().await?;

    if catalog.is_empty() {
        println!("{}", "The service catalog is empty".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<16} {:<24} {:<12} {:<9} {}",
            "TYPE", "NAME", "REGION", "INTERFACE", "URL"
        )
        .bold()
    );
    println!("{}", "─".repeat(100).dimmed());

    for entry in catalog.entries() {
        println!(
            "{:<16} {:<24} {:<12} {:<9} {}",
            entry.service_type.cyan(),
            entry.service_name,
            entry.region.as_deref().unwrap_or("-"),
            entry.interface.to_string(),
            entry.url
        );
    }
    Ok(())
}
