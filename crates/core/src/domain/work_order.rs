use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::text::{scalar_text, string_field};

pub const DEFAULT_OPEN_STATUSES: [&str; 3] = ["OPEN", "IN_PROGRESS", "ON_HOLD"];

/// Work order as surfaced to the agent, independent of the backend's payload shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderSummary {
    pub id: Value,
    pub code: Option<String>,
    pub title: String,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<String>,
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
}

impl WorkOrderSummary {
    pub fn from_backend(record: &Value) -> Option<Self> {
        if !record.is_object() {
            return None;
        }

        let id = record.get("id").cloned().unwrap_or(Value::Null);
        let custom_id = string_field(record, "customId");
        let code = string_field(record, "code")
            .or_else(|| custom_id.clone())
            .or_else(|| scalar_text(&id));
        let title = string_field(record, "title")
            .or_else(|| string_field(record, "description"))
            .unwrap_or_else(|| "Work order".to_string());
        let asset = match record.get("asset") {
            Some(asset @ Value::Object(_)) => {
                string_field(asset, "name").or_else(|| string_field(asset, "customId"))
            }
            Some(other) => scalar_text(other),
            None => None,
        };

        Some(Self {
            id,
            code,
            title,
            priority: string_field(record, "priority"),
            status: string_field(record, "status"),
            due_date: string_field(record, "dueDate"),
            asset,
            custom_id,
        })
    }

    /// True when `reference` equals this order's id, code or custom id as text.
    pub fn matches_reference(&self, reference: &str) -> bool {
        let reference = reference.trim();
        [scalar_text(&self.id), self.code.clone(), self.custom_id.clone()]
            .into_iter()
            .flatten()
            .any(|identifier| identifier == reference)
    }

    pub fn display_code(&self) -> String {
        self.code.clone().or_else(|| scalar_text(&self.id)).unwrap_or_else(|| "unknown".to_string())
    }
}

/// Extracts the result list from either `{results: [...]}` or a bare array.
pub fn result_items(response: &Value) -> &[Value] {
    response
        .get("results")
        .and_then(Value::as_array)
        .or_else(|| response.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn normalize_work_orders(response: &Value, limit: usize) -> Vec<WorkOrderSummary> {
    result_items(response).iter().filter_map(WorkOrderSummary::from_backend).take(limit).collect()
}

pub fn summarize_work_orders(work_orders: &[WorkOrderSummary]) -> String {
    if work_orders.is_empty() {
        return "No matching work orders were returned.".to_string();
    }

    let noun = if work_orders.len() == 1 { "order" } else { "orders" };
    let mut lines = vec![format!("Found {} work {noun}.", work_orders.len())];
    for order in work_orders {
        let mut meta = Vec::new();
        if let Some(priority) = &order.priority {
            meta.push(format!("Priority {priority}"));
        }
        if let Some(status) = &order.status {
            meta.push(format!("Status {status}"));
        }
        if let Some(asset) = &order.asset {
            meta.push(format!("Asset {asset}"));
        }
        let suffix = if meta.is_empty() { String::new() } else { format!(" ({})", meta.join("; ")) };
        lines.push(format!("- {}: {}{suffix}", order.display_code(), order.title));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{normalize_work_orders, summarize_work_orders, WorkOrderSummary};

    #[test]
    fn normalizes_nested_and_flat_asset_shapes() {
        let nested = WorkOrderSummary::from_backend(&json!({
            "id": 101,
            "title": "Inspect HVAC filters",
            "asset": {"name": "HQ HVAC-1", "customId": "A-1"}
        }))
        .expect("object record");
        assert_eq!(nested.asset.as_deref(), Some("HQ HVAC-1"));
        assert_eq!(nested.code.as_deref(), Some("101"));

        let flat = WorkOrderSummary::from_backend(&json!({"id": 5, "asset": "Boiler 2"}))
            .expect("object record");
        assert_eq!(flat.asset.as_deref(), Some("Boiler 2"));
        assert_eq!(flat.title, "Work order");
    }

    #[test]
    fn code_prefers_code_then_custom_id_then_id() {
        let record = WorkOrderSummary::from_backend(&json!({"id": 9, "customId": "WO-C9"}))
            .expect("object record");
        assert_eq!(record.code.as_deref(), Some("WO-C9"));
        assert!(record.matches_reference("9"));
        assert!(record.matches_reference("WO-C9"));
        assert!(!record.matches_reference("WO-10"));
    }

    #[test]
    fn normalization_truncates_to_limit_and_skips_non_objects() {
        let response = json!({
            "results": [{"id": 1}, "garbage", {"id": 2}, {"id": 3}],
            "total": 4
        });
        let orders = normalize_work_orders(&response, 2);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].id, json!(2));

        let bare = normalize_work_orders(&json!([{"id": 4}]), 5);
        assert_eq!(bare.len(), 1);
    }

    #[test]
    fn summary_lists_each_order_with_metadata() {
        let orders = normalize_work_orders(
            &json!([{"id": 101, "code": "WO-101", "title": "Inspect HVAC filters",
                     "priority": "HIGH", "status": "OPEN", "asset": "HQ HVAC-1"}]),
            5,
        );
        let summary = summarize_work_orders(&orders);
        assert!(summary.starts_with("Found 1 work order."));
        assert!(summary
            .contains("- WO-101: Inspect HVAC filters (Priority HIGH; Status OPEN; Asset HQ HVAC-1)"));
        assert_eq!(summarize_work_orders(&[]), "No matching work orders were returned.");
    }
}
