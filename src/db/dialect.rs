// SQL Dialects
// Per-engine quoting, row-limit syntax, capability flags and catalog queries

use crate::db::traits::Capabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `"name"` (ANSI)
    DoubleQuote,
    /// `` `name` `` (MySQL family)
    Backtick,
    /// `[name]` (SQL Server)
    Bracket,
}

impl QuoteStyle {
    fn delimiters(self) -> (char, char) {
        match self {
            QuoteStyle::DoubleQuote => ('"', '"'),
            QuoteStyle::Backtick => ('`', '`'),
            QuoteStyle::Bracket => ('[', ']'),
        }
    }

    /// Wraps `name` in quotes, doubling every embedded closing quote
    pub fn quote(self, name: &str) -> String {
        let (open, close) = self.delimiters();
        let doubled: String = [close, close].iter().collect();
        format!("{}{}{}", open, name.replace(close, &doubled), close)
    }

    /// Inverse of `quote`. `None` if `quoted` is not a quoted identifier.
    pub fn unquote(self, quoted: &str) -> Option<String> {
        let (open, close) = self.delimiters();
        let inner = quoted.strip_prefix(open)?.strip_suffix(close)?;
        let doubled: String = [close, close].iter().collect();
        Some(inner.replace(&doubled, &close.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// `SELECT ... LIMIT n`
    Limit,
    /// `SELECT ... ROWS n` (Firebird)
    Rows,
    /// `SELECT TOP n ...` (SQL Server)
    Top,
    /// `SELECT ... FETCH FIRST n ROWS ONLY` (Oracle)
    FetchFirst,
}

/// How bind parameters are spelled in the engine's SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`, one value per occurrence
    Question,
    /// `$1`, values shared by name
    Dollar,
    /// `@P1`, values shared by name
    AtP,
    /// `:1`, one value per occurrence
    Colon,
}

/// Which name parts `build_select_query` prefixes to a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualification {
    TableOnly,
    Database,
    Schema,
    DatabaseSchema,
}

/// Introspection SQL for one engine.
///
/// Templates take the named parameters `:database`, `:schema`, `:table` and
/// `:name`, rendered by [`render_catalog_query`]. `{db}` expands to the
/// quoted database followed by a dot, or to nothing.
///
/// Result shapes, by position:
/// - `databases`, `procedures`, `sequences`, `primary_keys`: name
/// - `tables`, `views`: schema, name
/// - `columns`: name, data type
/// - `indexes`: name, table, unique
/// - `index_columns`: column, unique, index type, DDL
/// - `triggers`: name, table
/// - `trigger_definition`: timing, event, DDL
/// - `sequence_definition`: start, increment, min, max, cycle
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    pub databases: Option<&'static str>,
    pub tables: &'static str,
    pub views: &'static str,
    pub primary_keys: Option<&'static str>,
    pub columns: &'static str,
    pub procedures: Option<&'static str>,
    pub indexes: Option<&'static str>,
    pub index_columns: Option<&'static str>,
    pub triggers: Option<&'static str>,
    pub trigger_definition: Option<&'static str>,
    pub sequences: Option<&'static str>,
    pub sequence_definition: Option<&'static str>,
}

/// Everything that distinguishes one SQL engine from another for the
/// shared cursor-based adapter.
#[derive(Debug)]
pub struct Dialect {
    pub name: &'static str,
    pub quote: QuoteStyle,
    pub limit: LimitStyle,
    pub qualification: Qualification,
    pub placeholder: PlaceholderStyle,
    pub default_schema: &'static str,
    pub capabilities: Capabilities,
    pub test_query: &'static str,
    pub default_port: Option<u16>,
    pub driver_import_names: &'static [&'static str],
    pub install_hint: &'static str,
    /// The missing component is a platform client library rather than a
    /// crate feature
    pub platform_driver: bool,
    pub catalog: Catalog,
}

impl Dialect {
    pub fn quote_identifier(&self, name: &str) -> String {
        self.quote.quote(name)
    }

    pub fn qualified_name(&self, table: &str, database: Option<&str>, schema: Option<&str>) -> String {
        let database = database.filter(|d| !d.is_empty());
        let schema = schema
            .filter(|s| !s.is_empty())
            .or(Some(self.default_schema).filter(|s| !s.is_empty()));

        let mut parts = Vec::with_capacity(3);
        match self.qualification {
            Qualification::TableOnly => {}
            Qualification::Database => parts.extend(database),
            Qualification::Schema => parts.extend(schema),
            Qualification::DatabaseSchema => {
                parts.extend(database);
                parts.extend(schema);
            }
        }
        parts.push(table);
        parts
            .iter()
            .map(|p| self.quote_identifier(p))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn build_select_query(
        &self,
        table: &str,
        limit: usize,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> String {
        let target = self.qualified_name(table, database, schema);
        match self.limit {
            LimitStyle::Limit => format!("SELECT * FROM {} LIMIT {}", target, limit),
            LimitStyle::Rows => format!("SELECT * FROM {} ROWS {}", target, limit),
            LimitStyle::Top => format!("SELECT TOP {} * FROM {}", limit, target),
            LimitStyle::FetchFirst => format!("SELECT * FROM {} FETCH FIRST {} ROWS ONLY", target, limit),
        }
    }
}

/// Values for a catalog template's named parameters. Empty strings count
/// as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogArgs<'a> {
    pub database: Option<&'a str>,
    pub schema: Option<&'a str>,
    pub table: Option<&'a str>,
    pub name: Option<&'a str>,
}

impl<'a> CatalogArgs<'a> {
    pub fn database(database: Option<&'a str>) -> Self {
        Self {
            database,
            ..Self::default()
        }
    }

    pub fn with_schema(mut self, schema: Option<&'a str>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    fn lookup(&self, key: &str) -> Option<Option<&'a str>> {
        let value = match key {
            "database" => self.database,
            "schema" => self.schema,
            "table" => self.table,
            "name" => self.name,
            _ => return None,
        };
        Some(value.filter(|v| !v.is_empty()))
    }
}

/// Renders a catalog template into the dialect's placeholder syntax.
/// Absent parameters become a literal `NULL`; present ones are returned as
/// bind values in placeholder order. `::` casts and quoted literals are
/// left untouched.
pub fn render_catalog_query(dialect: &Dialect, template: &str, args: &CatalogArgs) -> (String, Vec<String>) {
    let prefix = match args.database.filter(|d| !d.is_empty()) {
        Some(db) => format!("{}.", dialect.quote_identifier(db)),
        None => String::new(),
    };
    let template = template.replace("{db}", &prefix);

    let chars: Vec<char> = template.chars().collect();
    let mut sql = String::with_capacity(template.len());
    let mut params: Vec<String> = Vec::new();
    let mut slots: Vec<String> = Vec::new();
    let mut in_literal = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch == '\'' {
            in_literal = !in_literal;
            sql.push(ch);
            i += 1;
            continue;
        }
        if in_literal || ch != ':' {
            sql.push(ch);
            i += 1;
            continue;
        }
        if chars.get(i + 1) == Some(&':') {
            sql.push_str("::");
            i += 2;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        let key: String = chars[start..end].iter().collect();

        match args.lookup(&key) {
            None => {
                sql.push(ch);
                i += 1;
            }
            Some(None) => {
                sql.push_str("NULL");
                i = end;
            }
            Some(Some(value)) => {
                let placeholder = match dialect.placeholder {
                    PlaceholderStyle::Question => {
                        params.push(value.to_string());
                        "?".to_string()
                    }
                    PlaceholderStyle::Colon => {
                        params.push(value.to_string());
                        format!(":{}", params.len())
                    }
                    PlaceholderStyle::Dollar | PlaceholderStyle::AtP => {
                        let slot = match slots.iter().position(|s| *s == key) {
                            Some(pos) => pos + 1,
                            None => {
                                slots.push(key.clone());
                                params.push(value.to_string());
                                params.len()
                            }
                        };
                        if dialect.placeholder == PlaceholderStyle::Dollar {
                            format!("${}", slot)
                        } else {
                            format!("@P{}", slot)
                        }
                    }
                };
                sql.push_str(&placeholder);
                i = end;
            }
        }
    }

    (sql, params)
}

const POSTGRES_CAPABILITIES: Capabilities = Capabilities {
    multiple_databases: true,
    stored_procedures: true,
    indexes: true,
    triggers: true,
    sequences: true,
};

const MYSQL_CATALOG: Catalog = Catalog {
    databases: Some("SELECT schema_name FROM information_schema.schemata ORDER BY schema_name"),
    tables: "SELECT '' AS table_schema, table_name FROM information_schema.tables \
             WHERE table_schema = COALESCE(:database, DATABASE()) AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
    views: "SELECT '' AS table_schema, table_name FROM information_schema.views \
            WHERE table_schema = COALESCE(:database, DATABASE()) ORDER BY table_name",
    primary_keys: Some(
        "SELECT column_name FROM information_schema.key_column_usage \
         WHERE table_schema = COALESCE(:database, DATABASE()) AND table_name = :table \
         AND constraint_name = 'PRIMARY'",
    ),
    columns: "SELECT column_name, data_type FROM information_schema.columns \
              WHERE table_schema = COALESCE(:database, DATABASE()) AND table_name = :table \
              ORDER BY ordinal_position",
    procedures: Some(
        "SELECT routine_name FROM information_schema.routines \
         WHERE routine_schema = COALESCE(:database, DATABASE()) AND routine_type = 'PROCEDURE' \
         ORDER BY routine_name",
    ),
    indexes: Some(
        "SELECT DISTINCT index_name, table_name, CASE WHEN non_unique = 0 THEN 1 ELSE 0 END \
         FROM information_schema.statistics \
         WHERE table_schema = COALESCE(:database, DATABASE()) AND index_name <> 'PRIMARY' \
         ORDER BY table_name, index_name",
    ),
    index_columns: Some(
        "SELECT column_name, CASE WHEN non_unique = 0 THEN 1 ELSE 0 END, index_type, NULL \
         FROM information_schema.statistics \
         WHERE table_schema = COALESCE(:database, DATABASE()) AND table_name = :table \
         AND index_name = :name ORDER BY seq_in_index",
    ),
    triggers: Some(
        "SELECT trigger_name, event_object_table FROM information_schema.triggers \
         WHERE trigger_schema = COALESCE(:database, DATABASE()) \
         ORDER BY event_object_table, trigger_name",
    ),
    trigger_definition: Some(
        "SELECT action_timing, event_manipulation, action_statement FROM information_schema.triggers \
         WHERE trigger_schema = COALESCE(:database, DATABASE()) AND trigger_name = :name",
    ),
    sequences: None,
    sequence_definition: None,
};

const POSTGRES_CATALOG: Catalog = Catalog {
    databases: Some("SELECT datname::text FROM pg_database WHERE datistemplate = false ORDER BY datname"),
    tables: "SELECT table_schema::text, table_name::text FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' \
             AND table_schema NOT IN ('pg_catalog', 'information_schema') \
             ORDER BY table_schema, table_name",
    views: "SELECT table_schema::text, table_name::text FROM information_schema.views \
            WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
            ORDER BY table_schema, table_name",
    primary_keys: Some(
        "SELECT kcu.column_name::text FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
         WHERE tc.constraint_type = 'PRIMARY KEY' \
         AND tc.table_schema = :schema::text AND tc.table_name = :table::text",
    ),
    columns: "SELECT column_name::text, data_type::text FROM information_schema.columns \
              WHERE table_schema = :schema::text AND table_name = :table::text \
              ORDER BY ordinal_position",
    procedures: Some(
        "SELECT routine_name::text FROM information_schema.routines \
         WHERE routine_type = 'PROCEDURE' \
         AND routine_schema NOT IN ('pg_catalog', 'information_schema') \
         ORDER BY routine_name",
    ),
    indexes: Some(
        "SELECT indexname::text, tablename::text, indexdef LIKE 'CREATE UNIQUE%' FROM pg_indexes \
         WHERE schemaname NOT IN ('pg_catalog', 'information_schema') \
         ORDER BY tablename, indexname",
    ),
    index_columns: Some(
        "SELECT a.attname::text, ix.indisunique, am.amname::text, pg_get_indexdef(ix.indexrelid) \
         FROM pg_index ix \
         JOIN pg_class i ON i.oid = ix.indexrelid \
         JOIN pg_class t ON t.oid = ix.indrelid \
         JOIN pg_am am ON am.oid = i.relam \
         LEFT JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
         WHERE i.relname = :name::text AND t.relname = :table::text \
         ORDER BY array_position(ix.indkey::int2[], a.attnum)",
    ),
    triggers: Some(
        "SELECT trigger_name::text, event_object_table::text FROM information_schema.triggers \
         WHERE trigger_schema NOT IN ('pg_catalog', 'information_schema') \
         ORDER BY event_object_table, trigger_name",
    ),
    trigger_definition: Some(
        "SELECT tr.action_timing::text, tr.event_manipulation::text, \
         COALESCE((SELECT pg_get_triggerdef(t.oid) FROM pg_trigger t \
                   JOIN pg_class c ON c.oid = t.tgrelid \
                   WHERE t.tgname = :name::text AND c.relname = :table::text LIMIT 1), \
                  tr.action_statement::text) \
         FROM information_schema.triggers tr \
         WHERE tr.trigger_name = :name::text AND tr.event_object_table = :table::text",
    ),
    sequences: Some(
        "SELECT sequence_name::text FROM information_schema.sequences \
         WHERE sequence_schema NOT IN ('pg_catalog', 'information_schema') \
         ORDER BY sequence_name",
    ),
    sequence_definition: Some(
        "SELECT start_value::text, increment::text, minimum_value::text, maximum_value::text, \
         cycle_option::text FROM information_schema.sequences \
         WHERE sequence_name = :name::text \
         AND sequence_schema NOT IN ('pg_catalog', 'information_schema')",
    ),
};

pub static MYSQL: Dialect = MYSQL_TEMPLATE;

pub static MARIADB: Dialect = Dialect {
    name: "MariaDB",
    ..MYSQL_TEMPLATE
};

const MYSQL_TEMPLATE: Dialect = Dialect {
    name: "MySQL",
    quote: QuoteStyle::Backtick,
    limit: LimitStyle::Limit,
    qualification: Qualification::Database,
    placeholder: PlaceholderStyle::Question,
    default_schema: "",
    capabilities: Capabilities {
        multiple_databases: true,
        stored_procedures: true,
        indexes: true,
        triggers: true,
        sequences: false,
    },
    test_query: "SELECT 1",
    default_port: Some(3306),
    driver_import_names: &["sqlx-mysql"],
    install_hint: "Rebuild sqlterm-core with the `mysql` feature enabled.",
    platform_driver: false,
    catalog: MYSQL_CATALOG,
};

const POSTGRES_TEMPLATE: Dialect = Dialect {
    name: "PostgreSQL",
    quote: QuoteStyle::DoubleQuote,
    limit: LimitStyle::Limit,
    qualification: Qualification::Schema,
    placeholder: PlaceholderStyle::Dollar,
    default_schema: "public",
    capabilities: POSTGRES_CAPABILITIES,
    test_query: "SELECT 1",
    default_port: Some(5432),
    driver_import_names: &["tokio-postgres"],
    install_hint: "Rebuild sqlterm-core with the `postgres` feature enabled.",
    platform_driver: false,
    catalog: POSTGRES_CATALOG,
};

pub static POSTGRES: Dialect = POSTGRES_TEMPLATE;

pub static SUPABASE: Dialect = Dialect {
    name: "Supabase",
    ..POSTGRES_TEMPLATE
};

pub static COCKROACHDB: Dialect = Dialect {
    name: "CockroachDB",
    capabilities: Capabilities {
        triggers: false,
        ..POSTGRES_CAPABILITIES
    },
    default_port: Some(26257),
    catalog: Catalog {
        tables: "SELECT table_schema::text, table_name::text FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' \
                 AND table_schema NOT IN ('pg_catalog', 'information_schema', 'crdb_internal', 'pg_extension') \
                 ORDER BY table_schema, table_name",
        views: "SELECT table_schema::text, table_name::text FROM information_schema.views \
                WHERE table_schema NOT IN ('pg_catalog', 'information_schema', 'crdb_internal', 'pg_extension') \
                ORDER BY table_schema, table_name",
        triggers: None,
        trigger_definition: None,
        ..POSTGRES_CATALOG
    },
    ..POSTGRES_TEMPLATE
};

pub static MSSQL: Dialect = Dialect {
    name: "SQL Server",
    quote: QuoteStyle::Bracket,
    limit: LimitStyle::Top,
    qualification: Qualification::DatabaseSchema,
    placeholder: PlaceholderStyle::AtP,
    default_schema: "dbo",
    capabilities: Capabilities {
        multiple_databases: true,
        stored_procedures: true,
        indexes: true,
        triggers: true,
        sequences: true,
    },
    test_query: "SELECT 1",
    default_port: Some(1433),
    driver_import_names: &["tiberius"],
    install_hint: "Rebuild sqlterm-core with the `mssql` feature enabled.",
    platform_driver: false,
    catalog: Catalog {
        databases: Some("SELECT name FROM sys.databases ORDER BY name"),
        tables: "SELECT TABLE_SCHEMA, TABLE_NAME FROM {db}INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_SCHEMA, TABLE_NAME",
        views: "SELECT TABLE_SCHEMA, TABLE_NAME FROM {db}INFORMATION_SCHEMA.VIEWS \
                ORDER BY TABLE_SCHEMA, TABLE_NAME",
        primary_keys: Some(
            "SELECT kcu.COLUMN_NAME FROM {db}INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
             JOIN {db}INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
               ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA \
             WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' \
             AND tc.TABLE_SCHEMA = :schema AND tc.TABLE_NAME = :table",
        ),
        columns: "SELECT COLUMN_NAME, DATA_TYPE FROM {db}INFORMATION_SCHEMA.COLUMNS \
                  WHERE TABLE_SCHEMA = :schema AND TABLE_NAME = :table ORDER BY ORDINAL_POSITION",
        procedures: Some(
            "SELECT ROUTINE_NAME FROM {db}INFORMATION_SCHEMA.ROUTINES \
             WHERE ROUTINE_TYPE = 'PROCEDURE' ORDER BY ROUTINE_NAME",
        ),
        indexes: Some(
            "SELECT i.name, t.name, i.is_unique FROM {db}sys.indexes i \
             JOIN {db}sys.tables t ON i.object_id = t.object_id \
             WHERE i.is_primary_key = 0 AND i.name IS NOT NULL AND i.type > 0 \
             ORDER BY t.name, i.name",
        ),
        index_columns: Some(
            "SELECT c.name, i.is_unique, i.type_desc, NULL FROM {db}sys.indexes i \
             JOIN {db}sys.tables t ON i.object_id = t.object_id \
             JOIN {db}sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
             JOIN {db}sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
             WHERE i.name = :name AND t.name = :table ORDER BY ic.key_ordinal",
        ),
        triggers: Some(
            "SELECT tr.name, t.name FROM {db}sys.triggers tr \
             JOIN {db}sys.tables t ON tr.parent_id = t.object_id ORDER BY t.name, tr.name",
        ),
        trigger_definition: Some(
            "SELECT CASE WHEN tr.is_instead_of_trigger = 1 THEN 'INSTEAD OF' ELSE 'AFTER' END, \
             te.type_desc, m.definition FROM {db}sys.triggers tr \
             JOIN {db}sys.trigger_events te ON te.object_id = tr.object_id \
             JOIN {db}sys.sql_modules m ON m.object_id = tr.object_id \
             WHERE tr.name = :name",
        ),
        sequences: Some("SELECT name FROM {db}sys.sequences ORDER BY name"),
        sequence_definition: Some(
            "SELECT CAST(start_value AS BIGINT), CAST(increment AS BIGINT), \
             CAST(minimum_value AS BIGINT), CAST(maximum_value AS BIGINT), is_cycling \
             FROM {db}sys.sequences WHERE name = :name",
        ),
    },
};

pub static SQLITE: Dialect = Dialect {
    name: "SQLite",
    quote: QuoteStyle::DoubleQuote,
    limit: LimitStyle::Limit,
    qualification: Qualification::TableOnly,
    placeholder: PlaceholderStyle::Question,
    default_schema: "",
    capabilities: Capabilities {
        multiple_databases: false,
        stored_procedures: false,
        indexes: true,
        triggers: true,
        sequences: false,
    },
    test_query: "SELECT 1",
    default_port: None,
    driver_import_names: &["rusqlite"],
    install_hint: "Rebuild sqlterm-core with the `sqlite` feature enabled.",
    platform_driver: false,
    catalog: Catalog {
        databases: None,
        tables: "SELECT '' AS schema_name, name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        views: "SELECT '' AS schema_name, name FROM sqlite_master WHERE type = 'view' ORDER BY name",
        primary_keys: Some("SELECT name FROM pragma_table_info(:table) WHERE pk > 0 ORDER BY pk"),
        columns: "SELECT name, type FROM pragma_table_info(:table) ORDER BY cid",
        procedures: None,
        indexes: Some(
            "SELECT name, tbl_name, CASE WHEN upper(sql) LIKE 'CREATE UNIQUE%' THEN 1 ELSE 0 END \
             FROM sqlite_master WHERE type = 'index' AND name NOT LIKE 'sqlite_%' \
             ORDER BY tbl_name, name",
        ),
        index_columns: Some(
            "SELECT ii.name, CASE WHEN upper(m.sql) LIKE 'CREATE UNIQUE%' THEN 1 ELSE 0 END, NULL, m.sql \
             FROM sqlite_master m JOIN pragma_index_info(m.name) ii \
             WHERE m.type = 'index' AND m.name = :name ORDER BY ii.seqno",
        ),
        triggers: Some("SELECT name, tbl_name FROM sqlite_master WHERE type = 'trigger' ORDER BY tbl_name, name"),
        trigger_definition: Some(
            "SELECT NULL, NULL, sql FROM sqlite_master WHERE type = 'trigger' AND name = :name",
        ),
        sequences: None,
        sequence_definition: None,
    },
};

pub static DUCKDB: Dialect = Dialect {
    name: "DuckDB",
    quote: QuoteStyle::DoubleQuote,
    limit: LimitStyle::Limit,
    qualification: Qualification::Schema,
    placeholder: PlaceholderStyle::Question,
    default_schema: "main",
    capabilities: Capabilities {
        multiple_databases: false,
        stored_procedures: false,
        indexes: true,
        triggers: false,
        sequences: true,
    },
    test_query: "SELECT 1",
    default_port: None,
    driver_import_names: &["duckdb"],
    install_hint: "DuckDB support is not bundled with this build.",
    platform_driver: false,
    catalog: Catalog {
        databases: None,
        tables: "SELECT table_schema, table_name FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' ORDER BY table_schema, table_name",
        views: "SELECT schema_name, view_name FROM duckdb_views() WHERE NOT internal \
                ORDER BY schema_name, view_name",
        primary_keys: Some(
            "SELECT unnest(constraint_column_names) FROM duckdb_constraints() \
             WHERE constraint_type = 'PRIMARY KEY' AND schema_name = :schema AND table_name = :table",
        ),
        columns: "SELECT column_name, data_type FROM information_schema.columns \
                  WHERE table_schema = :schema AND table_name = :table ORDER BY ordinal_position",
        procedures: None,
        indexes: Some("SELECT index_name, table_name, is_unique FROM duckdb_indexes() ORDER BY table_name, index_name"),
        index_columns: Some(
            "SELECT NULL, is_unique, NULL, sql FROM duckdb_indexes() \
             WHERE index_name = :name AND table_name = :table",
        ),
        triggers: None,
        trigger_definition: None,
        sequences: Some("SELECT sequence_name FROM duckdb_sequences() ORDER BY sequence_name"),
        sequence_definition: Some(
            "SELECT start_value, increment_by, min_value, max_value, cycle FROM duckdb_sequences() \
             WHERE sequence_name = :name",
        ),
    },
};

pub static ORACLE: Dialect = Dialect {
    name: "Oracle",
    quote: QuoteStyle::DoubleQuote,
    limit: LimitStyle::FetchFirst,
    qualification: Qualification::Schema,
    placeholder: PlaceholderStyle::Colon,
    default_schema: "",
    capabilities: Capabilities {
        multiple_databases: false,
        stored_procedures: true,
        indexes: true,
        triggers: true,
        sequences: true,
    },
    test_query: "SELECT 1 FROM dual",
    default_port: Some(1521),
    driver_import_names: &["oracle"],
    install_hint: "Install Oracle Instant Client and build with an Oracle driver.",
    platform_driver: true,
    catalog: Catalog {
        databases: None,
        tables: "SELECT NULL, table_name FROM user_tables ORDER BY table_name",
        views: "SELECT NULL, view_name FROM user_views ORDER BY view_name",
        primary_keys: Some(
            "SELECT cols.column_name FROM user_constraints cons \
             JOIN user_cons_columns cols ON cons.constraint_name = cols.constraint_name \
             WHERE cons.constraint_type = 'P' AND cons.table_name = :table",
        ),
        columns: "SELECT column_name, data_type FROM user_tab_columns \
                  WHERE table_name = :table ORDER BY column_id",
        procedures: Some(
            "SELECT object_name FROM user_procedures WHERE object_type = 'PROCEDURE' ORDER BY object_name",
        ),
        indexes: Some(
            "SELECT index_name, table_name, CASE WHEN uniqueness = 'UNIQUE' THEN 1 ELSE 0 END \
             FROM user_indexes ORDER BY table_name, index_name",
        ),
        index_columns: Some(
            "SELECT ic.column_name, CASE WHEN i.uniqueness = 'UNIQUE' THEN 1 ELSE 0 END, i.index_type, NULL \
             FROM user_indexes i JOIN user_ind_columns ic ON ic.index_name = i.index_name \
             WHERE i.index_name = :name AND i.table_name = :table ORDER BY ic.column_position",
        ),
        triggers: Some("SELECT trigger_name, table_name FROM user_triggers ORDER BY table_name, trigger_name"),
        trigger_definition: Some(
            "SELECT trigger_type, triggering_event, trigger_body FROM user_triggers WHERE trigger_name = :name",
        ),
        sequences: Some("SELECT sequence_name FROM user_sequences ORDER BY sequence_name"),
        sequence_definition: Some(
            "SELECT NULL, increment_by, min_value, max_value, cycle_flag FROM user_sequences \
             WHERE sequence_name = :name",
        ),
    },
};

pub static FIREBIRD: Dialect = Dialect {
    name: "Firebird",
    quote: QuoteStyle::DoubleQuote,
    limit: LimitStyle::Rows,
    qualification: Qualification::TableOnly,
    placeholder: PlaceholderStyle::Question,
    default_schema: "",
    capabilities: Capabilities {
        multiple_databases: false,
        stored_procedures: true,
        indexes: true,
        triggers: true,
        sequences: true,
    },
    test_query: "SELECT 1 FROM rdb$database",
    default_port: Some(3050),
    driver_import_names: &["firebird"],
    install_hint: "Firebird support is not bundled with this build.",
    platform_driver: false,
    catalog: Catalog {
        databases: None,
        tables: "SELECT '', TRIM(rdb$relation_name) FROM rdb$relations \
                 WHERE rdb$view_blr IS NULL AND (rdb$system_flag IS NULL OR rdb$system_flag = 0) \
                 ORDER BY 2",
        views: "SELECT '', TRIM(rdb$relation_name) FROM rdb$relations \
                WHERE rdb$view_blr IS NOT NULL AND (rdb$system_flag IS NULL OR rdb$system_flag = 0) \
                ORDER BY 2",
        primary_keys: Some(
            "SELECT TRIM(sg.rdb$field_name) FROM rdb$indices ix \
             JOIN rdb$index_segments sg ON sg.rdb$index_name = ix.rdb$index_name \
             JOIN rdb$relation_constraints rc ON rc.rdb$index_name = ix.rdb$index_name \
             WHERE rc.rdb$constraint_type = 'PRIMARY KEY' AND rc.rdb$relation_name = :table",
        ),
        columns: "SELECT TRIM(rf.rdb$field_name), \
                  CASE f.rdb$field_type WHEN 7 THEN 'SMALLINT' WHEN 8 THEN 'INTEGER' \
                  WHEN 16 THEN 'BIGINT' WHEN 10 THEN 'FLOAT' WHEN 27 THEN 'DOUBLE PRECISION' \
                  WHEN 12 THEN 'DATE' WHEN 13 THEN 'TIME' WHEN 35 THEN 'TIMESTAMP' \
                  WHEN 14 THEN 'CHAR' WHEN 37 THEN 'VARCHAR' WHEN 261 THEN 'BLOB' \
                  WHEN 23 THEN 'BOOLEAN' ELSE 'UNKNOWN' END \
                  FROM rdb$relation_fields rf JOIN rdb$fields f ON f.rdb$field_name = rf.rdb$field_source \
                  WHERE rf.rdb$relation_name = :table ORDER BY rf.rdb$field_position",
        procedures: Some(
            "SELECT TRIM(rdb$procedure_name) FROM rdb$procedures WHERE rdb$system_flag = 0 ORDER BY 1",
        ),
        indexes: Some(
            "SELECT TRIM(rdb$index_name), TRIM(rdb$relation_name), COALESCE(rdb$unique_flag, 0) \
             FROM rdb$indices WHERE rdb$system_flag = 0 ORDER BY 2, 1",
        ),
        index_columns: Some(
            "SELECT TRIM(sg.rdb$field_name), COALESCE(ix.rdb$unique_flag, 0), \
             CASE WHEN ix.rdb$index_type = 1 THEN 'DESCENDING' ELSE 'ASCENDING' END, \
             ix.rdb$expression_source FROM rdb$indices ix \
             LEFT JOIN rdb$index_segments sg ON sg.rdb$index_name = ix.rdb$index_name \
             WHERE ix.rdb$index_name = :name ORDER BY sg.rdb$field_position",
        ),
        triggers: Some(
            "SELECT TRIM(rdb$trigger_name), TRIM(rdb$relation_name) FROM rdb$triggers \
             WHERE rdb$system_flag = 0 ORDER BY 2, 1",
        ),
        trigger_definition: Some(
            "SELECT CASE WHEN MOD(rdb$trigger_type, 2) = 1 THEN 'BEFORE' ELSE 'AFTER' END, \
             CASE rdb$trigger_type WHEN 1 THEN 'INSERT' WHEN 2 THEN 'INSERT' \
             WHEN 3 THEN 'UPDATE' WHEN 4 THEN 'UPDATE' WHEN 5 THEN 'DELETE' WHEN 6 THEN 'DELETE' END, \
             rdb$trigger_source FROM rdb$triggers WHERE rdb$trigger_name = :name",
        ),
        sequences: Some(
            "SELECT TRIM(rdb$generator_name) FROM rdb$generators WHERE rdb$system_flag = 0 ORDER BY 1",
        ),
        sequence_definition: Some(
            "SELECT rdb$initial_value, rdb$generator_increment, NULL, NULL, NULL FROM rdb$generators \
             WHERE rdb$system_flag = 0 AND rdb$generator_name = :name",
        ),
    },
};
