//! Core types for Stagewise
//!
//! Pipelines, their ordered stages, and the schemas flowing between them.
//! These are value types: a pipeline is fetched (or generated) once per test
//! run and not mutated by the orchestrator afterwards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Data handed to a stage and produced by it: field name to value.
pub type DataPayload = Map<String, Value>;

/// Pipeline status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Draft,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PipelineStatus::Running)
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, PipelineStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PipelineStatus::Failed)
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Draft => write!(f, "Draft"),
            PipelineStatus::Ready => write!(f, "Ready"),
            PipelineStatus::Running => write!(f, "Running"),
            PipelineStatus::Completed => write!(f, "Completed"),
            PipelineStatus::Failed => write!(f, "Failed"),
            PipelineStatus::Cancelled => write!(f, "Cancelled"),
            PipelineStatus::Paused => write!(f, "Paused"),
        }
    }
}

/// Stage type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    Source,
    Transformation,
    Filter,
    Join,
    Aggregate,
    Sort,
    Union,
    Lookup,
    Pivot,
    Unpivot,
    Window,
    Custom,
    Target,
    Validation,
}

impl Default for StageType {
    fn default() -> Self {
        Self::Transformation
    }
}

impl StageType {
    /// Parse a type tag as sent by the remote system.
    ///
    /// Matching is case-insensitive. Unknown or empty tags fall back to
    /// `Transformation`, which is what the remote treats as the generic stage.
    pub fn parse_lenient(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "source" => StageType::Source,
            "filter" => StageType::Filter,
            "join" => StageType::Join,
            "aggregate" => StageType::Aggregate,
            "sort" => StageType::Sort,
            "union" => StageType::Union,
            "lookup" => StageType::Lookup,
            "pivot" => StageType::Pivot,
            "unpivot" => StageType::Unpivot,
            "window" => StageType::Window,
            "custom" => StageType::Custom,
            "target" => StageType::Target,
            "validation" => StageType::Validation,
            _ => StageType::Transformation,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, StageType::Source)
    }

    pub fn is_target(&self) -> bool {
        matches!(self, StageType::Target)
    }

    /// True for the whole transformation family, including `Custom`.
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            StageType::Transformation
                | StageType::Filter
                | StageType::Join
                | StageType::Aggregate
                | StageType::Sort
                | StageType::Union
                | StageType::Lookup
                | StageType::Pivot
                | StageType::Unpivot
                | StageType::Window
                | StageType::Custom
        )
    }
}

impl std::fmt::Display for StageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageType::Source => "Source",
            StageType::Transformation => "Transformation",
            StageType::Filter => "Filter",
            StageType::Join => "Join",
            StageType::Aggregate => "Aggregate",
            StageType::Sort => "Sort",
            StageType::Union => "Union",
            StageType::Lookup => "Lookup",
            StageType::Pivot => "Pivot",
            StageType::Unpivot => "Unpivot",
            StageType::Window => "Window",
            StageType::Custom => "Custom",
            StageType::Target => "Target",
            StageType::Validation => "Validation",
        };
        write!(f, "{}", name)
    }
}

/// Stage status
///
/// Lifecycle: `Pending -> Running -> {Completed | Failed | Skipped}`.
/// A pending stage may also be skipped directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Completed | StageStatus::Failed | StageStatus::Skipped
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, StageStatus::Running)
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, StageStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageStatus::Failed)
    }

    /// Whether `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Pending, StageStatus::Running)
                | (StageStatus::Pending, StageStatus::Skipped)
                | (StageStatus::Running, StageStatus::Completed)
                | (StageStatus::Running, StageStatus::Failed)
                | (StageStatus::Running, StageStatus::Skipped)
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "Pending"),
            StageStatus::Running => write!(f, "Running"),
            StageStatus::Completed => write!(f, "Completed"),
            StageStatus::Failed => write!(f, "Failed"),
            StageStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Field data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Long,
    Double,
    Float,
    Boolean,
    Date,
    Timestamp,
    Decimal,
    Binary,
    Array,
    Map,
    Struct,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Integer | DataType::Long | DataType::Double | DataType::Float | DataType::Decimal
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Timestamp)
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, DataType::Array | DataType::Map | DataType::Struct)
    }
}

impl std::str::FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let data_type = match s.trim().to_ascii_lowercase().as_str() {
            "string" => DataType::String,
            "integer" | "int" => DataType::Integer,
            "long" => DataType::Long,
            "double" => DataType::Double,
            "float" => DataType::Float,
            "boolean" | "bool" => DataType::Boolean,
            "date" => DataType::Date,
            "timestamp" => DataType::Timestamp,
            "decimal" => DataType::Decimal,
            "binary" => DataType::Binary,
            "array" => DataType::Array,
            "map" => DataType::Map,
            "struct" => DataType::Struct,
            other => {
                return Err(Error::InvalidData(format!("unknown data type '{}'", other)));
            }
        };
        Ok(data_type)
    }
}

/// A single named, typed field of a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl SchemaField {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Named, ordered list of fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSchema {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<SchemaField>,
    #[serde(default)]
    pub description: Option<String>,
}

impl DataSchema {
    pub fn new(name: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        Self {
            name: name.into(),
            fields,
            description: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn add_field(&mut self, field: SchemaField) {
        self.fields.push(field);
    }

    pub fn remove_field(&mut self, name: &str) {
        self.fields.retain(|f| f.name != name);
    }
}

/// One stage of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stage_type: StageType,
    /// Position declared by the remote system. Execution order is the list
    /// order returned by the API, not this value.
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub configuration: DataPayload,
    #[serde(default)]
    pub input_schema: Option<DataSchema>,
    #[serde(default)]
    pub output_schema: Option<DataSchema>,
    #[serde(default)]
    pub status: StageStatus,
}

impl Stage {
    pub fn new(id: impl Into<String>, name: impl Into<String>, stage_type: StageType, order: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stage_type,
            order,
            description: None,
            configuration: DataPayload::new(),
            input_schema: None,
            output_schema: None,
            status: StageStatus::Pending,
        }
    }

    /// Move the stage to `next`, rejecting transitions the lifecycle forbids.
    pub fn transition(&mut self, next: StageStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// A pipeline and its ordered stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: PipelineStatus,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_project() -> String {
    "default".to_string()
}

impl Pipeline {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            project: default_project(),
            version: None,
            status: PipelineStatus::Draft,
            stages: Vec::new(),
            created_by: None,
            created_at: None,
        }
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn stage_by_name(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("SOURCE", StageType::Source)]
    #[test_case("filter", StageType::Filter)]
    #[test_case(" Target ", StageType::Target)]
    #[test_case("Validation", StageType::Validation)]
    #[test_case("spark-sql", StageType::Transformation)]
    #[test_case("", StageType::Transformation)]
    fn test_parse_stage_type(tag: &str, expected: StageType) {
        assert_eq!(StageType::parse_lenient(tag), expected);
    }

    #[test]
    fn test_transformation_family() {
        assert!(StageType::Custom.is_transformation());
        assert!(StageType::Window.is_transformation());
        assert!(!StageType::Source.is_transformation());
        assert!(!StageType::Target.is_transformation());
        assert!(!StageType::Validation.is_transformation());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(PipelineStatus::Cancelled.is_terminal());
        assert!(!PipelineStatus::Paused.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }

    #[test]
    fn test_stage_lifecycle() {
        let mut stage = Stage::new("s1", "Read customers", StageType::Source, 1);
        stage.transition(StageStatus::Running).unwrap();
        stage.transition(StageStatus::Completed).unwrap();

        let err = stage.transition(StageStatus::Running).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert_eq!(stage.status, StageStatus::Completed);
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut stage = Stage::new("s1", "Read customers", StageType::Source, 1);
        assert!(stage.transition(StageStatus::Completed).is_err());
        assert!(stage.transition(StageStatus::Skipped).is_ok());
    }

    #[test]
    fn test_schema_field_lookup() {
        let mut schema = DataSchema::new(
            "orders",
            vec![
                SchemaField::new("order_id", DataType::String, false),
                SchemaField::new("amount", DataType::Decimal, true),
            ],
        );
        assert!(schema.has_field("amount"));
        assert_eq!(schema.field("order_id").map(|f| f.nullable), Some(false));

        schema.remove_field("amount");
        assert_eq!(schema.field_count(), 1);
    }

    #[test]
    fn test_data_type_from_str() {
        assert_eq!("INTEGER".parse::<DataType>().unwrap(), DataType::Integer);
        assert!("uuid".parse::<DataType>().is_err());
    }

    #[test]
    fn test_pipeline_defaults_from_json() {
        let pipeline: Pipeline = serde_json::from_str(r#"{"id": "p1", "name": "Customers"}"#).unwrap();
        assert_eq!(pipeline.project, "default");
        assert_eq!(pipeline.status, PipelineStatus::Draft);
        assert!(pipeline.stages.is_empty());
    }
}
