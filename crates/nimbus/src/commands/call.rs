use anyhow::Context;
use colored::Colorize;
use nimbus_cloud::{CloudClient, Headers, Method, ResponseBody};

fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Invalid header '{}': expected 'Name: value'", raw))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

pub async fn handle(
    client: &CloudClient,
    path: &str,
    method: &str,
    data: Option<String>,
    headers: &[String],
) -> anyhow::Result<()> {
    let method: Method = method.parse().map_err(anyhow::Error::msg)?;
    let headers = headers
        .iter()
        .map(|h| parse_header(h))
        .collect::<anyhow::Result<Headers>>()?;

    let response = client
        .executor()
        .call(path, method, headers, data.map(String::into_bytes))
        .await?;

    eprintln!("{} {}", "HTTP".dimmed(), response.status.to_string().green());
    match ResponseBody::from_response(&response)? {
        ResponseBody::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        ResponseBody::Xml(text) => println!("{}", text),
        ResponseBody::Raw(_) => println!("{}", response.text()),
        ResponseBody::Empty => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("X-Trace:  abc ").unwrap(),
            ("X-Trace".to_string(), "abc".to_string())
        );
        assert!(parse_header("no-colon").is_err());
    }
}
