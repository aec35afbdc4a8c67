//! Object storage for listing images.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use super::{AccessToken, SupabaseClient, SupabaseError};

/// An uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Path inside the bucket.
    pub path: String,
    /// Public URL of the object.
    pub public_url: String,
}

impl SupabaseClient {
    /// Upload `bytes` to `path` in the listing bucket. Existing objects are
    /// never overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error whose kind is `Duplicate` if the path is taken.
    #[instrument(skip(self, bytes, token), fields(size = bytes.len()))]
    pub async fn upload_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        token: &AccessToken,
    ) -> Result<StoredObject, SupabaseError> {
        let url = self.endpoint(&format!(
            "storage/v1/object/{}/{path}",
            self.inner.bucket
        ))?;
        let request = self
            .authorize(self.inner.http.post(url), Some(token))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("cache-control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes);
        Self::send(request).await?;

        Ok(StoredObject {
            path: path.to_string(),
            public_url: self.public_url(path),
        })
    }

    /// Public URL of an object in the listing bucket.
    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}storage/v1/object/public/{}/{path}",
            self.inner.base_url, self.inner.bucket
        )
    }

    /// Inverse of [`public_url`](Self::public_url); `None` for URLs that do
    /// not point into the listing bucket.
    #[must_use]
    pub fn object_path(&self, public_url: &str) -> Option<String> {
        let prefix = self.public_url("");
        public_url
            .strip_prefix(&prefix)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
    }

    /// Delete objects from the listing bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, paths, token), fields(count = paths.len()))]
    pub async fn remove_objects(
        &self,
        paths: &[String],
        token: &AccessToken,
    ) -> Result<(), SupabaseError> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&format!("storage/v1/object/{}", self.inner.bucket))?;
        let request = self
            .authorize(self.inner.http.delete(url), Some(token))
            .json(&json!({ "prefixes": paths }));
        Self::send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::SupabaseConfig;

    fn client() -> SupabaseClient {
        let config = SupabaseConfig {
            url: "https://abcd.supabase.co".to_string(),
            anon_key: SecretString::from("anon"),
            storage_bucket: "product-images".to_string(),
        };
        SupabaseClient::new(&config, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            client().public_url("u1/p1/0.jpg"),
            "https://abcd.supabase.co/storage/v1/object/public/product-images/u1/p1/0.jpg"
        );
    }

    #[test]
    fn test_object_path_round_trip() {
        let client = client();
        let url = client.public_url("u1/p1/3.jpg");
        assert_eq!(client.object_path(&url).as_deref(), Some("u1/p1/3.jpg"));
        assert_eq!(client.object_path("https://cdn.example.com/x.jpg"), None);
    }
}
