//! Registry payload models

use dop_types::Version;
use serde::{Deserialize, Serialize};

/// One recipe revision reference inside a version listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeRef {
    pub revision: String,
}

/// One published version of a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionPayload {
    pub version: Version,
    #[serde(default)]
    pub recipes: Vec<RecipeRef>,
}

/// A package as listed by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagePayload {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<VersionPayload>,
}

/// A fully-identified recipe revision, ready to download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeRevisionPayload {
    pub name: String,
    pub version: Version,
    pub revision: String,
    #[serde(rename = "archive-name")]
    pub archive_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_payload_parses() {
        let json = r#"{
            "name": "zlib",
            "versions": [
                { "version": "1.2.13", "recipes": [{ "revision": "0123456789abcdef" }] },
                { "version": "1.3.1" }
            ]
        }"#;
        let payload: PackagePayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.versions.len(), 2);
        assert_eq!(payload.versions[0].recipes[0].revision, "0123456789abcdef");
        assert!(payload.versions[1].recipes.is_empty());
    }

    #[test]
    fn revision_payload_round_trip() {
        let payload = RecipeRevisionPayload {
            name: "zlib".to_string(),
            version: Version::new(1, 3, 1),
            revision: "0123456789abcdef".to_string(),
            archive_name: "zlib-1.3.1-0123456789abcdef.tar.xz".to_string(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"archive-name\""));
        let back: RecipeRevisionPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.archive_name, payload.archive_name);
    }
}
