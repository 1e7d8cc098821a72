use anyhow::{Context, Result};
use panoply_core::{list_fields, list_resources, to_record, Field, Resource};
use serde::de::DeserializeOwned;
use std::path::Path;

pub fn cmd_record(resource: &str, data: &str) -> Result<()> {
    let data = serde_json::from_str(data).context("Record data is not valid JSON")?;
    let group = to_record(resource, data)?;
    println!("{}", serde_json::to_string_pretty(&group)?);
    Ok(())
}

async fn read_descriptors<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

pub async fn cmd_resources(path: &Path) -> Result<()> {
    let resources: Vec<Resource> = read_descriptors(path).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&list_resources(&resources))?
    );
    Ok(())
}

pub async fn cmd_fields(path: &Path) -> Result<()> {
    let fields: Vec<Field> = read_descriptors(path).await?;
    println!("{}", serde_json::to_string_pretty(&list_fields(&fields))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_descriptors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "users", "title": "Users"}}, {{"id": "orders", "title": "Orders"}}]"#
        )
        .unwrap();

        let resources: Vec<Resource> = read_descriptors(file.path()).await.unwrap();
        let options = list_resources(&resources).unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].value, "users");
    }

    #[tokio::test]
    async fn test_read_descriptors_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let err = read_descriptors::<Field>(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_record_rejects_scalars() {
        assert!(cmd_record("users", "42").is_err());
        assert!(cmd_record("users", "{oops").is_err());
    }
}
