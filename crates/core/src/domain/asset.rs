use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::work_order::result_items;
use crate::text::{scalar_text, string_field};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub id: Value,
    pub name: String,
    pub status: Option<String>,
    pub location: Option<String>,
    pub custom_id: Option<String>,
}

impl AssetSummary {
    pub fn from_backend(record: &Value) -> Option<Self> {
        if !record.is_object() {
            return None;
        }

        let custom_id = string_field(record, "customId");
        let location = match record.get("location") {
            Some(location @ Value::Object(_)) => {
                string_field(location, "name").or_else(|| string_field(location, "customId"))
            }
            Some(other) => scalar_text(other),
            None => None,
        };

        Some(Self {
            id: record.get("id").cloned().unwrap_or(Value::Null),
            name: string_field(record, "name")
                .or_else(|| custom_id.clone())
                .unwrap_or_else(|| "Asset".to_string()),
            status: string_field(record, "status"),
            location,
            custom_id,
        })
    }
}

pub fn normalize_assets(response: &Value, limit: usize) -> Vec<AssetSummary> {
    result_items(response).iter().filter_map(AssetSummary::from_backend).take(limit).collect()
}

pub fn summarize_assets(assets: &[AssetSummary]) -> String {
    if assets.is_empty() {
        return "No assets matched that request.".to_string();
    }

    assets
        .iter()
        .map(|asset| {
            let mut meta = Vec::new();
            if let Some(status) = &asset.status {
                meta.push(format!("Status {status}"));
            }
            if let Some(location) = &asset.location {
                meta.push(format!("Location {location}"));
            }
            if let Some(custom_id) = &asset.custom_id {
                meta.push(format!("ID {custom_id}"));
            }
            let suffix =
                if meta.is_empty() { String::new() } else { format!(" ({})", meta.join("; ")) };
            format!("- {}{suffix}", asset.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{normalize_assets, summarize_assets};

    #[test]
    fn normalizes_location_and_name_fallbacks() {
        let assets = normalize_assets(
            &json!({"results": [
                {"id": 1, "name": "Chiller", "location": {"name": "Roof"}, "status": "OPERATIONAL"},
                {"id": 2, "customId": "PMP-7", "location": "Basement"},
                {"id": 3}
            ]}),
            10,
        );

        assert_eq!(assets.len(), 3);
        assert_eq!(assets[0].location.as_deref(), Some("Roof"));
        assert_eq!(assets[1].name, "PMP-7");
        assert_eq!(assets[1].location.as_deref(), Some("Basement"));
        assert_eq!(assets[2].name, "Asset");
    }

    #[test]
    fn summary_renders_metadata() {
        let assets = normalize_assets(
            &json!([{"id": 1, "name": "Chiller", "status": "DOWN", "customId": "CH-1"}]),
            5,
        );
        assert_eq!(summarize_assets(&assets), "- Chiller (Status DOWN; ID CH-1)");
        assert_eq!(summarize_assets(&[]), "No assets matched that request.");
    }
}
