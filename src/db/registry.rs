// Provider Registry
// Maps a database type key to its connection form metadata and adapter constructor

use crate::db::drivers;
use crate::db::traits::{DatabaseAdapter, DatabaseError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Port shown when a database type is unknown
pub const FALLBACK_PORT: &str = "1433";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Password,
    Select,
    Dropdown,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }
}

/// One input of a connection form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default: String,
    pub placeholder: String,
    pub description: String,
    pub options: Vec<SelectOption>,
    /// Fields sharing a group are laid out on one row
    pub group: Option<String>,
    pub advanced: bool,
    pub tab: String,
}

impl SchemaField {
    fn new(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type: FieldType::Text,
            required: false,
            default: String::new(),
            placeholder: String::new(),
            description: String::new(),
            options: Vec::new(),
            group: None,
            advanced: false,
            tab: "general".to_string(),
        }
    }

    fn field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn default_value(mut self, value: &str) -> Self {
        self.default = value.to_string();
        self
    }

    fn placeholder(mut self, value: &str) -> Self {
        self.placeholder = value.to_string();
        self
    }

    fn description(mut self, value: &str) -> Self {
        self.description = value.to_string();
        self
    }

    fn options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options.iter().map(|(v, l)| SelectOption::new(v, l)).collect();
        self
    }

    fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    fn advanced(mut self) -> Self {
        self.advanced = true;
        self
    }

    fn tab(mut self, tab: &str) -> Self {
        self.tab = tab.to_string();
        self
    }
}

/// Connection form metadata for one database type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSchema {
    pub db_type: String,
    pub display_name: String,
    pub fields: Vec<SchemaField>,
    pub supports_ssh: bool,
    pub is_file_based: bool,
    pub has_advanced_auth: bool,
    pub default_port: String,
    pub requires_auth: bool,
}

impl ConnectionSchema {
    fn new(db_type: &str, display_name: &str, fields: Vec<SchemaField>) -> Self {
        Self {
            db_type: db_type.to_string(),
            display_name: display_name.to_string(),
            fields,
            supports_ssh: true,
            is_file_based: false,
            has_advanced_auth: false,
            default_port: String::new(),
            requires_auth: true,
        }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub type AdapterConstructor = Arc<dyn Fn() -> Arc<dyn DatabaseAdapter> + Send + Sync>;

/// Registry entry: form metadata plus the adapter constructor
#[derive(Clone)]
pub struct ProviderSpec {
    pub schema: ConnectionSchema,
    pub constructor: AdapterConstructor,
}

impl ProviderSpec {
    pub fn new(
        schema: ConnectionSchema,
        constructor: impl Fn() -> Arc<dyn DatabaseAdapter> + Send + Sync + 'static,
    ) -> Self {
        Self {
            schema,
            constructor: Arc::new(constructor),
        }
    }
}

impl std::fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("db_type", &self.schema.db_type)
            .finish_non_exhaustive()
    }
}

/// Database types whose driver should be reported missing even when it is
/// compiled in. Used by tests to exercise install and recovery flows.
#[derive(Debug, Clone, Default)]
pub struct DriverOverrides {
    missing: HashSet<String>,
}

impl DriverOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn missing<I, S>(db_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            missing: db_types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_missing(&self, db_type: &str) -> bool {
        self.missing.contains(db_type)
    }
}

/// Lookup table of supported database types, in registration order
pub struct ProviderRegistry {
    providers: Vec<ProviderSpec>,
    overrides: DriverOverrides,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            overrides: DriverOverrides::default(),
        }
    }

    /// Registry with every built-in database type
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ProviderSpec::new(mssql_schema(), drivers::mssql_adapter));
        registry.register(ProviderSpec::new(sqlite_schema(), drivers::sqlite_adapter));
        registry.register(ProviderSpec::new(postgresql_schema(), drivers::postgresql_adapter));
        registry.register(ProviderSpec::new(mysql_schema(), drivers::mysql_adapter));
        registry.register(ProviderSpec::new(oracle_schema(), drivers::oracle_adapter));
        registry.register(ProviderSpec::new(mariadb_schema(), drivers::mariadb_adapter));
        registry.register(ProviderSpec::new(duckdb_schema(), drivers::duckdb_adapter));
        registry.register(ProviderSpec::new(cockroachdb_schema(), drivers::cockroachdb_adapter));
        registry.register(ProviderSpec::new(supabase_schema(), drivers::supabase_adapter));
        registry.register(ProviderSpec::new(firebird_schema(), drivers::firebird_adapter));
        registry
    }

    pub fn with_overrides(mut self, overrides: DriverOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Register a provider, replacing any existing entry for the same key
    pub fn register(&mut self, spec: ProviderSpec) {
        let db_type = spec.schema.db_type.clone();
        match self.providers.iter_mut().find(|p| p.schema.db_type == db_type) {
            Some(existing) => *existing = spec,
            None => self.providers.push(spec),
        }
        debug!(db_type = %db_type, "Registered provider");
    }

    pub fn supported_db_types(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.schema.db_type.as_str()).collect()
    }

    pub fn schemas(&self) -> Vec<&ConnectionSchema> {
        self.providers.iter().map(|p| &p.schema).collect()
    }

    fn find(&self, db_type: &str) -> Option<&ProviderSpec> {
        self.providers.iter().find(|p| p.schema.db_type == db_type)
    }

    pub fn get_provider_spec(&self, db_type: &str) -> Result<&ProviderSpec, DatabaseError> {
        self.find(db_type)
            .ok_or_else(|| DatabaseError::UnknownProvider(db_type.to_string()))
    }

    pub fn get_connection_schema(&self, db_type: &str) -> Result<&ConnectionSchema, DatabaseError> {
        self.get_provider_spec(db_type).map(|spec| &spec.schema)
    }

    /// Builds the adapter for a database type. A type listed in the driver
    /// overrides fails with a missing-driver error.
    pub fn get_adapter(&self, db_type: &str) -> Result<Arc<dyn DatabaseAdapter>, DatabaseError> {
        let spec = self.get_provider_spec(db_type)?;
        let adapter = (spec.constructor)();
        if self.overrides.is_missing(db_type) {
            debug!(db_type = %db_type, "Driver forced missing by override");
            return Err(DatabaseError::MissingDriver {
                driver: adapter.name().to_string(),
                hint: adapter.install_hint(),
            });
        }
        Ok(adapter)
    }

    // Display helpers degrade to a default instead of failing

    pub fn get_default_port(&self, db_type: &str) -> String {
        self.find(db_type)
            .map(|p| p.schema.default_port.clone())
            .unwrap_or_else(|| FALLBACK_PORT.to_string())
    }

    pub fn get_display_name(&self, db_type: &str) -> String {
        self.find(db_type)
            .map(|p| p.schema.display_name.clone())
            .unwrap_or_else(|| db_type.to_string())
    }

    pub fn supports_ssh(&self, db_type: &str) -> bool {
        self.find(db_type).is_some_and(|p| p.schema.supports_ssh)
    }

    pub fn is_file_based(&self, db_type: &str) -> bool {
        self.find(db_type).is_some_and(|p| p.schema.is_file_based)
    }

    pub fn has_advanced_auth(&self, db_type: &str) -> bool {
        self.find(db_type).is_some_and(|p| p.schema.has_advanced_auth)
    }

    pub fn requires_auth(&self, db_type: &str) -> bool {
        self.find(db_type).map_or(true, |p| p.schema.requires_auth)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// Built-in connection schemas
// ============================================================================

fn server_field(placeholder: &str) -> SchemaField {
    SchemaField::new("server", "Server")
        .placeholder(placeholder)
        .required()
        .group("server_port")
}

fn port_field(default: &str) -> SchemaField {
    SchemaField::new("port", "Port")
        .placeholder(default)
        .default_value(default)
        .group("server_port")
}

fn database_field() -> SchemaField {
    SchemaField::new("database", "Database").placeholder("(empty = browse all)")
}

fn username_field(required: bool) -> SchemaField {
    let field = SchemaField::new("username", "Username")
        .placeholder("username")
        .group("credentials");
    if required {
        field.required()
    } else {
        field
    }
}

fn password_field() -> SchemaField {
    SchemaField::new("password", "Password")
        .field_type(FieldType::Password)
        .placeholder("(empty = ask every connect)")
        .group("credentials")
}

fn file_path_field(placeholder: &str) -> SchemaField {
    SchemaField::new("file_path", "Database File")
        .field_type(FieldType::File)
        .placeholder(placeholder)
        .required()
}

fn ssh_fields() -> Vec<SchemaField> {
    vec![
        SchemaField::new("ssh_enabled", "Tunnel")
            .field_type(FieldType::Select)
            .options(&[("disabled", "Disabled"), ("enabled", "Enabled")])
            .default_value("disabled")
            .tab("ssh"),
        SchemaField::new("ssh_host", "Host")
            .placeholder("bastion.example.com")
            .required()
            .tab("ssh"),
        SchemaField::new("ssh_port", "Port")
            .placeholder("22")
            .default_value("22")
            .tab("ssh"),
        SchemaField::new("ssh_username", "Username")
            .placeholder("ubuntu")
            .required()
            .tab("ssh"),
        SchemaField::new("ssh_auth_type", "Auth")
            .field_type(FieldType::Select)
            .options(&[("key", "Key File"), ("password", "Password")])
            .default_value("key")
            .tab("ssh"),
        SchemaField::new("ssh_key_path", "Key Path")
            .field_type(FieldType::File)
            .placeholder("~/.ssh/id_rsa")
            .default_value("~/.ssh/id_rsa")
            .tab("ssh"),
        SchemaField::new("ssh_password", "Password")
            .field_type(FieldType::Password)
            .placeholder("(empty = ask every connect)")
            .tab("ssh"),
    ]
}

/// Standard server/port/database/credentials form followed by the SSH tab
fn server_schema(db_type: &str, display_name: &str, port: &str, extra: Vec<SchemaField>) -> ConnectionSchema {
    let mut fields = vec![
        server_field("localhost"),
        port_field(port),
        database_field(),
        username_field(true),
        password_field(),
    ];
    fields.extend(extra);
    fields.extend(ssh_fields());

    let mut schema = ConnectionSchema::new(db_type, display_name, fields);
    schema.default_port = port.to_string();
    schema
}

fn mssql_schema() -> ConnectionSchema {
    let mut fields = vec![
        server_field("server\\instance"),
        port_field("1433"),
        database_field(),
        SchemaField::new("auth_type", "Authentication")
            .field_type(FieldType::Dropdown)
            .options(&[
                ("sql", "SQL Server Authentication"),
                ("windows", "Windows Authentication"),
                ("ad_password", "Microsoft Entra Password"),
                ("ad_interactive", "Microsoft Entra Interactive"),
                ("ad_integrated", "Microsoft Entra Integrated"),
            ])
            .default_value("sql"),
        username_field(false),
        password_field(),
        SchemaField::new("trust_server_certificate", "Trust Server Certificate")
            .field_type(FieldType::Select)
            .options(&[("true", "Yes"), ("false", "No")])
            .default_value("true")
            .advanced(),
        SchemaField::new("encrypt", "Encrypt")
            .field_type(FieldType::Select)
            .options(&[("false", "Off"), ("true", "Required")])
            .default_value("false")
            .advanced(),
    ];
    fields.extend(ssh_fields());

    let mut schema = ConnectionSchema::new("mssql", "SQL Server", fields);
    schema.default_port = "1433".to_string();
    schema.has_advanced_auth = true;
    schema
}

fn file_schema(db_type: &str, display_name: &str, placeholder: &str) -> ConnectionSchema {
    let mut schema = ConnectionSchema::new(db_type, display_name, vec![file_path_field(placeholder)]);
    schema.supports_ssh = false;
    schema.is_file_based = true;
    schema.requires_auth = false;
    schema
}

fn sqlite_schema() -> ConnectionSchema {
    file_schema("sqlite", "SQLite", "/path/to/database.db")
}

fn duckdb_schema() -> ConnectionSchema {
    file_schema("duckdb", "DuckDB", "/path/to/database.duckdb")
}

fn postgresql_schema() -> ConnectionSchema {
    server_schema("postgresql", "PostgreSQL", "5432", Vec::new())
}

fn mysql_schema() -> ConnectionSchema {
    server_schema("mysql", "MySQL", "3306", Vec::new())
}

fn mariadb_schema() -> ConnectionSchema {
    server_schema("mariadb", "MariaDB", "3306", Vec::new())
}

fn cockroachdb_schema() -> ConnectionSchema {
    let mut schema = server_schema("cockroachdb", "CockroachDB", "26257", Vec::new());
    schema.requires_auth = false;
    if let Some(username) = schema.fields.iter_mut().find(|f| f.name == "username") {
        username.required = false;
        username.placeholder = "root".to_string();
    }
    schema
}

fn oracle_schema() -> ConnectionSchema {
    let role = SchemaField::new("oracle_role", "Role")
        .field_type(FieldType::Select)
        .options(&[("normal", "Normal"), ("sysdba", "SYSDBA"), ("sysoper", "SYSOPER")])
        .default_value("normal");
    let mut schema = server_schema("oracle", "Oracle", "1521", vec![role]);
    if let Some(database) = schema.fields.iter_mut().find(|f| f.name == "database") {
        database.label = "Service Name".to_string();
        database.placeholder = "ORCL or XEPDB1".to_string();
        database.required = true;
    }
    schema
}

const SUPABASE_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "sa-east-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-central-2",
    "eu-north-1",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ap-northeast-2",
];

fn supabase_schema() -> ConnectionSchema {
    let regions: Vec<(&str, &str)> = SUPABASE_REGIONS.iter().map(|r| (*r, *r)).collect();
    let fields = vec![
        SchemaField::new("supabase_region", "Region")
            .field_type(FieldType::Dropdown)
            .options(&regions)
            .default_value("us-east-1")
            .required(),
        SchemaField::new("supabase_project_id", "Project ID")
            .placeholder("abcdefghijklmnop")
            .description("Found in the project's connection settings")
            .required(),
        password_field(),
    ];

    let mut schema = ConnectionSchema::new("supabase", "Supabase", fields);
    schema.supports_ssh = false;
    schema.default_port = "5432".to_string();
    schema
}

fn firebird_schema() -> ConnectionSchema {
    let mut schema = server_schema("firebird", "Firebird", "3050", Vec::new());
    if let Some(server) = schema.fields.iter_mut().find(|f| f.name == "server") {
        server.required = false;
    }
    if let Some(database) = schema.fields.iter_mut().find(|f| f.name == "database") {
        database.label = "Database Path".to_string();
        database.placeholder = "/var/lib/firebird/data/employee.fdb".to_string();
        database.required = true;
    }
    schema
}
