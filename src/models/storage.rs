use serde::{Deserialize, Serialize};

/// Connection settings for the S3-compatible photo bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3StorageConfig {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>, // For S3-compatible services
    pub prefix: String,               // Logical folder for photo keys
    pub public_url: Option<String>,   // Base URL photos are served from
}

impl S3StorageConfig {
    /// Full object key for a storage key, namespaced under the configured folder
    pub fn object_key(&self, key: &str) -> String {
        let folder = self.prefix.trim_matches('/');
        if folder.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", folder, key)
        }
    }

    /// Externally resolvable URL of an object
    pub fn public_url_for(&self, object_key: &str) -> String {
        if let Some(base) = self.public_url.as_deref().filter(|u| !u.is_empty()) {
            return format!("{}/{}", base.trim_end_matches('/'), object_key);
        }

        match self.endpoint_url.as_deref().filter(|u| !u.is_empty()) {
            // Path-style addressing for S3-compatible services
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket_name, object_key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket_name,
                if self.region.is_empty() { "us-east-1" } else { &self.region },
                object_key
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3StorageConfig {
        S3StorageConfig {
            bucket_name: "personnel".to_string(),
            region: "us-east-2".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            endpoint_url: None,
            prefix: "/fotos/".to_string(),
            public_url: None,
        }
    }

    #[test]
    fn object_keys_are_namespaced() {
        assert_eq!(config().object_key("1_2.jpg"), "fotos/1_2.jpg");

        let mut bare = config();
        bare.prefix = String::new();
        assert_eq!(bare.object_key("1_2.jpg"), "1_2.jpg");
    }

    #[test]
    fn public_url_prefers_explicit_base() {
        let mut cfg = config();
        assert_eq!(
            cfg.public_url_for("fotos/1_2.jpg"),
            "https://personnel.s3.us-east-2.amazonaws.com/fotos/1_2.jpg"
        );

        cfg.endpoint_url = Some("http://minio:9000/".to_string());
        assert_eq!(cfg.public_url_for("fotos/1_2.jpg"), "http://minio:9000/personnel/fotos/1_2.jpg");

        cfg.public_url = Some("https://cdn.example.com/".to_string());
        assert_eq!(cfg.public_url_for("fotos/1_2.jpg"), "https://cdn.example.com/fotos/1_2.jpg");
    }
}
