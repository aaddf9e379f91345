//! Static tool registry.
//!
//! Tools that exist regardless of remote discovery: fallbacks for common
//! errands (each answers with a machine-readable "service unavailable"
//! payload) and the handoff tool.

use serde_json::{json, Value};

use super::descriptor::{ToolDescriptor, ToolSet};
use super::handoff::handoff_tool;
use super::schema::{ArgSchema, FieldType};

/// Registry of statically declared tools.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: ToolSet,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The baseline set: five fallback errand tools plus the handoff tool.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for tool in fallback_tools() {
            registry.register(tool);
        }
        registry.register(handoff_tool());
        registry
    }

    /// Register a tool. A later registration with the same name wins.
    pub fn register(&mut self, tool: ToolDescriptor) {
        if let Some(previous) = self.tools.insert(tool) {
            tracing::debug!(tool = %previous.name(), "static tool replaced by later registration");
        }
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Payload returned by every fallback tool.
pub fn service_unavailable(tool: &str, service: &str) -> Value {
    json!({
        "status": "error",
        "error": "service_unavailable",
        "tool": tool,
        "message": format!("The {service} service is not connected right now."),
    })
}

fn fallback(name: &str, description: &str, service: &'static str, schema: ArgSchema) -> ToolDescriptor {
    let tool_name = name.to_string();
    ToolDescriptor::from_fn(name, description, schema, move |_args| {
        service_unavailable(&tool_name, service)
    })
}

fn fallback_tools() -> Vec<ToolDescriptor> {
    vec![
        fallback(
            "book_ride",
            "Book a ride from a pickup location to a destination.",
            "ride booking",
            ArgSchema::new()
                .required("pickup", FieldType::String, "Pickup address")
                .required("destination", FieldType::String, "Destination address")
                .optional_enum("ride_type", &["economy", "comfort", "xl"], "Vehicle class"),
        ),
        fallback(
            "order_food",
            "Order food for delivery from a restaurant.",
            "food delivery",
            ArgSchema::new()
                .required("restaurant", FieldType::String, "Restaurant name")
                .required("items", FieldType::Array, "Items to order")
                .optional("delivery_address", FieldType::String, "Where to deliver"),
        ),
        fallback(
            "schedule_appointment",
            "Put an appointment on the user's calendar.",
            "calendar",
            ArgSchema::new()
                .required("title", FieldType::String, "What the appointment is")
                .required("datetime", FieldType::String, "Start time, ISO 8601")
                .optional("duration_minutes", FieldType::Integer, "Length in minutes"),
        ),
        fallback(
            "book_restaurant",
            "Reserve a table at a restaurant.",
            "restaurant reservation",
            ArgSchema::new()
                .required("restaurant", FieldType::String, "Restaurant name")
                .required("datetime", FieldType::String, "Reservation time, ISO 8601")
                .required("party_size", FieldType::Integer, "Number of guests"),
        ),
        fallback(
            "book_hotel",
            "Book a hotel room.",
            "hotel booking",
            ArgSchema::new()
                .required("location", FieldType::String, "City or hotel name")
                .required("check_in", FieldType::String, "Check-in date, YYYY-MM-DD")
                .required("check_out", FieldType::String, "Check-out date, YYYY-MM-DD")
                .optional("guests", FieldType::Integer, "Number of guests"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::handoff::HANDOFF_TOOL_NAME;

    #[test]
    fn test_defaults_have_six_tools() {
        let registry = ToolRegistry::with_defaults();
        assert_eq!(registry.len(), 6);
        assert!(registry.tools().contains(HANDOFF_TOOL_NAME));
        assert!(registry.tools().contains("book_hotel"));
    }

    #[tokio::test]
    async fn test_fallback_reports_unavailable() {
        let registry = ToolRegistry::with_defaults();
        let out = registry
            .tools()
            .get("book_ride")
            .unwrap()
            .invoke(json!({"pickup": "Home", "destination": "Airport"}))
            .await
            .unwrap();
        assert_eq!(out["status"], "error");
        assert_eq!(out["error"], "service_unavailable");
        assert_eq!(out["tool"], "book_ride");
    }

    #[test]
    fn test_register_same_name_last_wins() {
        let mut registry = ToolRegistry::with_defaults();
        registry.register(ToolDescriptor::from_fn(
            "book_ride",
            "Ride booking via partner",
            ArgSchema::new(),
            |_| json!({"status": "success"}),
        ));
        assert_eq!(registry.len(), 6);
        assert_eq!(
            registry.tools().get("book_ride").unwrap().description(),
            "Ride booking via partner"
        );
    }
}
