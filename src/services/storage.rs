use std::time::Duration;

use anyhow::Context;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;

use crate::core::config::Settings;

/// Object storage holding uploaded material files. Absent when S3 is not
/// configured; files are then read from the local upload directory.
#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if settings.s3().access_key.is_empty() || settings.s3().secret_key.is_empty() {
            return Ok(None);
        }

        let creds = Credentials::new(
            settings.s3().access_key.clone(),
            settings.s3().secret_key.clone(),
            None,
            None,
            "material-review-static",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.s3().region.clone()))
            .credentials_provider(creds);
        if !settings.s3().endpoint.is_empty() {
            loader = loader.endpoint_url(settings.s3().endpoint.clone());
        }
        let config = loader.load().await;

        let client = Client::new(&config);

        Ok(Some(Self { client, bucket: settings.s3().bucket.clone() }))
    }

    pub(crate) async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(expires_in)?)
            .await?;

        Ok(presigned.uri().to_string())
    }

    pub(crate) async fn get_bytes(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to fetch object {key}"))?;

        let bytes = object
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read object {key}"))?;

        Ok(bytes.into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::StorageService;
    use crate::core::config::Settings;
    use crate::test_support;
    use std::time::Duration;

    #[tokio::test]
    async fn disabled_without_credentials() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let storage = StorageService::from_settings(&settings).await.expect("storage");

        assert!(storage.is_none());
    }

    #[tokio::test]
    async fn presign_get_returns_url_for_key() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        test_support::set_test_storage_env();

        let settings = Settings::load().expect("settings");
        let storage = StorageService::from_settings(&settings)
            .await
            .expect("storage")
            .expect("storage enabled");

        let url = storage
            .presign_get("materials/m1/award.png", Duration::from_secs(300))
            .await
            .expect("presign get");

        assert!(url.contains("award.png"));
    }
}
