use crate::errors::AppResult;
use crate::models::Lead;
use anyhow::Context;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::path::PathBuf;

const BUNDLED_SEED: &str = include_str!("../data/leads.json");

static SEED_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "id": { "type": "integer", "minimum": 0 },
                "name": { "type": "string", "minLength": 1 },
                "company": { "type": "string", "minLength": 1 },
                "email": { "type": "string", "minLength": 1 },
                "status": { "enum": ["New", "Contacted", "Qualified"] },
                "source": { "type": "string", "minLength": 1 },
                "score": { "type": "integer", "minimum": 0, "maximum": 100 }
            },
            "required": ["id", "name", "company", "email", "status", "source", "score"]
        }
    })
});

static COMPILED_SEED_SCHEMA: Lazy<JSONSchema> =
    Lazy::new(|| JSONSchema::compile(&SEED_SCHEMA).expect("valid seed schema"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSource {
    Bundled,
    File(PathBuf),
    Inline(String),
}

impl SeedSource {
    pub fn from_setting(seed_path: Option<&str>) -> Self {
        match seed_path.map(str::trim) {
            Some(path) if !path.is_empty() => Self::File(PathBuf::from(path)),
            _ => Self::Bundled,
        }
    }

    pub async fn read(&self) -> AppResult<String> {
        match self {
            Self::Bundled => Ok(BUNDLED_SEED.to_string()),
            Self::Inline(raw) => Ok(raw.clone()),
            Self::File(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to load leads from {}", path.display()))?;
                Ok(raw)
            }
        }
    }
}

/// Parses seed JSON into leads, rejecting anything that does not match the lead schema.
pub fn parse_seed(raw: &str) -> Result<Vec<Lead>, String> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|error| format!("Seed data is not valid JSON: {}", error))?;

    let errors: Vec<String> = COMPILED_SEED_SCHEMA
        .validate(&value)
        .err()
        .map(|errors| {
            errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if !errors.is_empty() {
        return Err(format!("Seed data did not match lead schema: {}", errors.join("; ")));
    }

    serde_json::from_value(value).map_err(|error| format!("Seed data could not be decoded: {}", error))
}

#[cfg(test)]
mod tests {
    use super::{parse_seed, SeedSource, BUNDLED_SEED};
    use crate::models::LeadStatus;
    use std::path::PathBuf;

    #[test]
    fn bundled_seed_is_valid() {
        let leads = parse_seed(BUNDLED_SEED).expect("bundled seed");
        assert!(leads.len() >= 10);
        assert!(leads.iter().all(|lead| lead.score <= 100));
    }

    #[test]
    fn rejects_out_of_range_score() {
        let raw = r#"[{"id":1,"name":"A","company":"B","email":"a@b.co","status":"New","source":"Web","score":140}]"#;
        let err = parse_seed(raw).expect_err("score too high");
        assert!(err.contains("did not match lead schema"));
    }

    #[test]
    fn rejects_unknown_status_and_bad_json() {
        let raw = r#"[{"id":1,"name":"A","company":"B","email":"a@b.co","status":"Lost","source":"Web","score":40}]"#;
        assert!(parse_seed(raw).is_err());
        assert!(parse_seed("not json").expect_err("bad json").contains("not valid JSON"));
    }

    #[test]
    fn parses_minimal_record() {
        let raw = r#"[{"id":3,"name":"A","company":"B","email":"a@b.co","status":"Qualified","source":"Web","score":40}]"#;
        let leads = parse_seed(raw).expect("valid seed");
        assert_eq!(leads[0].id, 3);
        assert_eq!(leads[0].status, LeadStatus::Qualified);
    }

    #[test]
    fn blank_setting_means_bundled() {
        assert_eq!(SeedSource::from_setting(None), SeedSource::Bundled);
        assert_eq!(SeedSource::from_setting(Some("  ")), SeedSource::Bundled);
        assert_eq!(
            SeedSource::from_setting(Some("/tmp/leads.json")),
            SeedSource::File(PathBuf::from("/tmp/leads.json"))
        );
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = SeedSource::File(dir.path().join("absent.json"));
        let err = source.read().await.expect_err("missing file");
        assert!(err.to_string().contains("Failed to load leads"));
    }
}
