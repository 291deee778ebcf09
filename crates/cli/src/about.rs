//! `--about` output: a JSON description of the target and its settings.

use pinesink_core::{config::KNOWN_PROVIDERS, AppResult, SinkConfig};
use serde_json::{json, Value};

pub const TARGET_NAME: &str = "target-pinecone";

/// Describe the target and every recognized setting with its default.
pub fn about() -> Value {
    let defaults = SinkConfig::default();

    json!({
        "name": TARGET_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Singer target that upserts pre-computed embeddings into a Pinecone index",
        "capabilities": ["about", "stream-maps"],
        "settings": [
            setting("api_key", "string", true, Value::Null, "Your Pinecone API key"),
            setting("index_name", "string", true, Value::Null, "Target index"),
            setting("environment", "string", false, Value::Null, "Pinecone environment, e.g. us-west1-gcp; needed unless controller_url is set"),
            setting("document_text_property", "string", false, json!(defaults.document_text_property), "Input field holding the document text"),
            setting("embeddings_property", "string", false, json!(defaults.embeddings_property), "Input field holding the embedding"),
            setting("metadata_property", "string", false, json!(defaults.metadata_property), "Input field holding the metadata object"),
            setting("pinecone_metadata_text_key", "string", false, json!(defaults.pinecone_metadata_text_key), "Metadata key that receives the document text"),
            setting("dimensions", "integer", false, json!(defaults.dimensions), "Dimension used when a new index is created"),
            setting("load_method", "string", false, json!(defaults.load_method.as_str()), "append or overwrite"),
            setting("provider", "string", false, json!(defaults.provider), format!("One of: {}", KNOWN_PROVIDERS.join(", "))),
            setting("controller_url", "string", false, Value::Null, "Control-plane URL override"),
            setting("namespace", "string", false, Value::Null, "Namespace passed through on upsert"),
        ],
    })
}

fn setting(
    name: &str,
    kind: &str,
    required: bool,
    default: Value,
    description: impl Into<String>,
) -> Value {
    json!({
        "name": name,
        "type": kind,
        "required": required,
        "default": default,
        "description": description.into(),
    })
}

/// Print the description to stdout.
pub fn print_about() -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(&about())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_about_lists_every_setting() {
        let about = about();
        assert_eq!(about["name"], "target-pinecone");

        let names: Vec<&str> = about["settings"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        for key in [
            "api_key",
            "index_name",
            "environment",
            "document_text_property",
            "embeddings_property",
            "metadata_property",
            "pinecone_metadata_text_key",
            "dimensions",
            "load_method",
        ] {
            assert!(names.contains(&key), "missing setting {}", key);
        }
    }

    #[test]
    fn test_environment_is_optional() {
        let about = about();
        let environment = about["settings"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["name"] == "environment")
            .unwrap();
        assert_eq!(environment["required"], false);
        assert!(environment["description"]
            .as_str()
            .unwrap()
            .contains("controller_url"));
    }

    #[test]
    fn test_about_defaults() {
        let about = about();
        let dimensions = about["settings"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["name"] == "dimensions")
            .unwrap();
        assert_eq!(dimensions["default"], 1536);
    }
}
