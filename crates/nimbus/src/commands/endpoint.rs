use nimbus_cloud::CloudClient;

pub async fn handle(
    client: &CloudClient,
    service_type: &str,
    name: Option<String>,
    region: Option<String>,
) -> anyhow::Result<()> {
    let url = client
        .executor()
        .endpoint(service_type, name.as_deref(), region.as_deref())
        .await?;
    println!("{}", url);
    Ok(())
}
