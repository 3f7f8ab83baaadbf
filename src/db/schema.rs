// Schema Types
// Value objects returned by adapter introspection calls

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Column of a table or view. `data_type` is the engine's own type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub is_primary_key: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_primary_key: false,
        }
    }
}

/// Table or view identity. `schema` is empty for engines without schemas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
}

impl TableInfo {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub table_name: String,
    pub is_unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub name: String,
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceInfo {
    pub name: String,
}

/// Detailed index metadata. Fields the engine cannot provide stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub index_type: Option<String>,
    pub definition: Option<String>,
}

impl IndexDefinition {
    pub fn minimal(name: &str, table_name: &str) -> Self {
        Self {
            name: name.to_string(),
            table_name: table_name.to_string(),
            columns: Vec::new(),
            is_unique: false,
            index_type: None,
            definition: None,
        }
    }

    /// Builds `CREATE [UNIQUE ]INDEX` DDL from catalog metadata
    pub fn synthesize_ddl(&self, quote: impl Fn(&str) -> String) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if self.is_unique { "UNIQUE " } else { "" },
            quote(&self.name),
            quote(&self.table_name),
            columns
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub name: String,
    pub table_name: String,
    pub timing: Option<String>,
    pub event: Option<String>,
    pub definition: Option<String>,
}

impl TriggerDefinition {
    pub fn minimal(name: &str, table_name: &str) -> Self {
        Self {
            name: name.to_string(),
            table_name: table_name.to_string(),
            timing: None,
            event: None,
            definition: None,
        }
    }

    /// Fills timing and event from the trigger DDL when the catalog did not
    /// report them (SQLite only stores the CREATE TRIGGER text).
    pub fn infer_from_definition(&mut self) {
        let Some(ddl) = self.definition.as_deref() else {
            return;
        };
        let upper = ddl.to_uppercase();
        let words: Vec<&str> = upper.split_whitespace().collect();

        if self.timing.is_none() {
            self.timing = words.windows(2).find_map(|w| match w[0] {
                "BEFORE" => Some("BEFORE".to_string()),
                "AFTER" => Some("AFTER".to_string()),
                "INSTEAD" if w[1] == "OF" => Some("INSTEAD OF".to_string()),
                _ => None,
            });
        }
        if self.event.is_none() {
            let events: Vec<String> = words
                .iter()
                .take_while(|w| **w != "BEGIN" && **w != "AS" && **w != "FOR" && **w != "EXECUTE")
                .filter(|w| matches!(**w, "INSERT" | "UPDATE" | "DELETE"))
                .map(|w| w.to_string())
                .collect();
            if !events.is_empty() {
                self.event = Some(events.join(" OR "));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDefinition {
    pub name: String,
    pub start_value: Option<i64>,
    pub increment: Option<i64>,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub cycle: Option<bool>,
}

impl SequenceDefinition {
    pub fn minimal(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start_value: None,
            increment: None,
            min_value: None,
            max_value: None,
            cycle: None,
        }
    }
}

/// Definition of any detail-lookup object, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectDefinition {
    Index(IndexDefinition),
    Trigger(TriggerDefinition),
    Sequence(SequenceDefinition),
}

impl ObjectDefinition {
    pub fn name(&self) -> &str {
        match self {
            ObjectDefinition::Index(d) => &d.name,
            ObjectDefinition::Trigger(d) => &d.name,
            ObjectDefinition::Sequence(d) => &d.name,
        }
    }
}

/// Drops triggers already seen with the same (name, table), keeping the
/// first. Catalogs list a trigger once per firing event.
pub fn dedupe_triggers(triggers: Vec<TriggerInfo>) -> Vec<TriggerInfo> {
    let mut seen = HashSet::new();
    triggers
        .into_iter()
        .filter(|t| seen.insert((t.name.clone(), t.table_name.clone())))
        .collect()
}
