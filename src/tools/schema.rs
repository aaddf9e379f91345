//! Argument schemas for callable tools.
//!
//! A deliberately small subset of JSON Schema: a flat object whose fields are
//! typed, optionally required, and optionally restricted to an enumerated set
//! of string values. Remote schemas that fit this shape are translated; the
//! rest fall back to a single opaque `arguments` field.

use serde_json::{json, Map, Value};

/// Key the inference client uses when tool-call arguments were not valid JSON.
pub const RAW_ARGUMENTS_KEY: &str = "_raw";

/// Name of the single field carried by opaque schemas.
pub const OPAQUE_FIELD: &str = "arguments";

/// Type of one argument field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// No type constraint.
    Any,
}

impl FieldType {
    fn from_json_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    fn json_name(self) -> Option<&'static str> {
        match self {
            Self::String => Some("string"),
            Self::Number => Some("number"),
            Self::Integer => Some("integer"),
            Self::Boolean => Some("boolean"),
            Self::Array => Some("array"),
            Self::Object => Some("object"),
            Self::Any => None,
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

/// One named argument.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub description: String,
    pub required: bool,
    /// Allowed string values; empty means unrestricted.
    pub allowed: Vec<String>,
}

/// The argument schema of a tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgSchema {
    fields: Vec<FieldSpec>,
    opaque: bool,
}

impl ArgSchema {
    /// A schema with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fallback shape for tools whose schema could not be translated:
    /// one required `arguments` field holding an object or a JSON string.
    pub fn opaque() -> Self {
        Self {
            fields: vec![FieldSpec {
                name: OPAQUE_FIELD.to_string(),
                field_type: FieldType::Any,
                description: "Tool arguments as a JSON object (or a JSON-encoded string)".into(),
                required: true,
                allowed: Vec::new(),
            }],
            opaque: true,
        }
    }

    pub fn required(self, name: &str, field_type: FieldType, description: &str) -> Self {
        self.field(name, field_type, description, true, &[])
    }

    pub fn optional(self, name: &str, field_type: FieldType, description: &str) -> Self {
        self.field(name, field_type, description, false, &[])
    }

    /// A required string field restricted to `allowed`.
    pub fn required_enum(self, name: &str, allowed: &[&str], description: &str) -> Self {
        self.field(name, FieldType::String, description, true, allowed)
    }

    /// An optional string field restricted to `allowed`.
    pub fn optional_enum(self, name: &str, allowed: &[&str], description: &str) -> Self {
        self.field(name, FieldType::String, description, false, allowed)
    }

    fn field(
        mut self,
        name: &str,
        field_type: FieldType,
        description: &str,
        required: bool,
        allowed: &[&str],
    ) -> Self {
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldSpec {
            name: name.to_string(),
            field_type,
            description: description.to_string(),
            required,
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    /// Check `args` against the schema. Unknown fields are ignored.
    pub fn validate(&self, args: &Value) -> Result<(), String> {
        let empty = Map::new();
        let obj = match args {
            Value::Object(obj) => obj,
            Value::Null => &empty,
            other => {
                return Err(format!(
                    "arguments must be a JSON object, got {}",
                    json_kind(other)
                ))
            }
        };

        if let Some(raw) = obj.get(RAW_ARGUMENTS_KEY) {
            if obj.len() == 1 {
                return Err(format!(
                    "arguments are not valid JSON: {}",
                    raw.as_str().unwrap_or_default()
                ));
            }
        }

        for field in &self.fields {
            match obj.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(format!("missing required field: '{}'", field.name));
                    }
                }
                Some(value) => self.check_field(field, value)?,
            }
        }
        Ok(())
    }

    fn check_field(&self, field: &FieldSpec, value: &Value) -> Result<(), String> {
        if self.opaque && field.name == OPAQUE_FIELD {
            return match value {
                Value::Object(_) => Ok(()),
                Value::String(s) => match serde_json::from_str::<Value>(s) {
                    Ok(Value::Object(_)) => Ok(()),
                    _ => Err(format!("field '{OPAQUE_FIELD}' is not a JSON object string")),
                },
                other => Err(format!(
                    "field '{OPAQUE_FIELD}' must be an object or JSON string, got {}",
                    json_kind(other)
                )),
            };
        }

        if !field.field_type.accepts(value) {
            return Err(format!(
                "field '{}' must be {}, got {}",
                field.name,
                field.field_type.json_name().unwrap_or("any"),
                json_kind(value)
            ));
        }

        if !field.allowed.is_empty() {
            let ok = value
                .as_str()
                .is_some_and(|s| field.allowed.iter().any(|a| a == s));
            if !ok {
                return Err(format!(
                    "field '{}' must be one of [{}], got {value}",
                    field.name,
                    field.allowed.join(", ")
                ));
            }
        }
        Ok(())
    }

    /// Render as a JSON Schema object for function-calling requests.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut prop = Map::new();
            match field.field_type.json_name() {
                Some(t) => {
                    prop.insert("type".into(), json!(t));
                }
                None if self.opaque => {
                    prop.insert("type".into(), json!(["object", "string"]));
                }
                None => {}
            }
            if !field.description.is_empty() {
                prop.insert("description".into(), json!(field.description));
            }
            if !field.allowed.is_empty() {
                prop.insert("enum".into(), json!(field.allowed));
            }
            properties.insert(field.name.clone(), Value::Object(prop));
            if field.required {
                required.push(field.name.clone());
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Translate a provider's declared JSON Schema.
    ///
    /// Returns `None` when the schema is not a flat object of simple typed
    /// properties; callers then use [`ArgSchema::opaque`].
    pub fn from_json_schema(schema: &Value) -> Option<Self> {
        let obj = schema.as_object()?;

        match obj.get("type") {
            Some(Value::String(t)) if t == "object" => {}
            None if obj.contains_key("properties") => {}
            _ => return None,
        }
        for composite in ["oneOf", "anyOf", "allOf", "$ref", "not", "if"] {
            if obj.contains_key(composite) {
                return None;
            }
        }

        let required: Vec<&str> = match obj.get("required") {
            None => Vec::new(),
            Some(Value::Array(names)) => names.iter().map(|n| n.as_str()).collect::<Option<_>>()?,
            Some(_) => return None,
        };

        let mut translated = Self::new();
        let properties = match obj.get("properties") {
            None => return Some(translated),
            Some(Value::Object(props)) => props,
            Some(_) => return None,
        };

        for (name, prop) in properties {
            let prop = prop.as_object()?;
            let field_type = FieldType::from_json_name(prop.get("type")?.as_str()?)?;
            let allowed: Vec<String> = match prop.get("enum") {
                None => Vec::new(),
                Some(Value::Array(values)) if field_type == FieldType::String => values
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<_>>()?,
                Some(_) => return None,
            };

            translated.fields.push(FieldSpec {
                name: name.clone(),
                field_type,
                description: prop
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string(),
                required: required.contains(&name.as_str()),
                allowed,
            });
        }
        Some(translated)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
