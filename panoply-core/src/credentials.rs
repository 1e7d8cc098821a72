use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{PanoplyError, PanoplyResult};

const QUEUE_HOST_TEMPLATE: &str = "sqs.{region}.amazonaws.com";

/// API key / secret pair issued to a plugin.
///
/// * api key: `ACCOUNT/RAND1`
/// * api secret: `BASE64(RAND2/UUID/AWSACCOUNT/REGION)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
    account: String,
    rand: String,
    aws_account: String,
    region: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> PanoplyResult<Self> {
        let api_key = api_key.into();
        let api_secret = api_secret.into();

        let decoded = STANDARD.decode(api_secret.trim())?;
        let decoded = String::from_utf8(decoded)
            .map_err(|e| PanoplyError::CredentialDecode(e.to_string()))?;

        let parts: Vec<&str> = decoded.split('/').collect();
        if parts.len() != 4 {
            return Err(PanoplyError::InvalidCredentials(format!(
                "API secret must decode to 4 '/'-separated parts, got {}",
                parts.len()
            )));
        }

        let account = api_key
            .split('/')
            .next()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                PanoplyError::InvalidCredentials("API key has no account component".to_string())
            })?
            .to_string();

        Ok(Self {
            account,
            rand: parts[0].to_string(),
            aws_account: parts[2].to_string(),
            region: parts[3].to_string(),
            api_key,
            api_secret,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn aws_account(&self) -> &str {
        &self.aws_account
    }

    /// Queue URL: `https://sqs.REGION.amazonaws.com/AWSACCOUNT/sdk-ACCOUNT-RAND2`.
    pub fn endpoint_url(&self) -> String {
        format!(
            "https://{}/{}/sdk-{}-{}",
            QUEUE_HOST_TEMPLATE.replace("{region}", &self.region),
            self.aws_account,
            self.account,
            self.rand
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "test/key";

    fn encoded(secret: &str) -> String {
        STANDARD.encode(secret)
    }

    #[test]
    fn test_endpoint_url() {
        let creds = Credentials::new(TEST_KEY, encoded("rand2/uuid/awsaccount/region")).unwrap();
        assert_eq!(
            creds.endpoint_url(),
            "https://sqs.region.amazonaws.com/awsaccount/sdk-test-rand2"
        );
        assert_eq!(creds.account(), "test");
        assert_eq!(creds.region(), "region");
        assert_eq!(creds.aws_account(), "awsaccount");
    }

    #[test]
    fn test_wrong_part_count_fails() {
        let err = Credentials::new(TEST_KEY, encoded("rand2/uuid/awsaccount")).unwrap_err();
        assert!(matches!(err, PanoplyError::InvalidCredentials(_)));

        let err = Credentials::new(TEST_KEY, encoded("a/b/c/d/e")).unwrap_err();
        assert!(matches!(err, PanoplyError::InvalidCredentials(_)));
    }

    #[test]
    fn test_invalid_base64_fails() {
        let err = Credentials::new(TEST_KEY, "***not base64***").unwrap_err();
        assert!(matches!(err, PanoplyError::CredentialDecode(_)));
    }

    #[test]
    fn test_empty_account_fails() {
        let err = Credentials::new("/key", encoded("r/u/a/region")).unwrap_err();
        assert!(matches!(err, PanoplyError::InvalidCredentials(_)));
    }
}
