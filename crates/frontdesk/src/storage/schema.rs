//! `SQLite` schema definitions for frontdesk.
//!
//! Local mode keeps whole-value blobs keyed by name, so the schema is a
//! single key/value table plus the metadata table used for versioning.

/// SQL statement to create the blobs table.
pub const CREATE_BLOBS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS blobs (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_BLOBS_TABLE, CREATE_METADATA_TABLE];

/// SQL used to provision the remote `patients` table on the hosted service.
///
/// Printed by `frontdesk config schema`; never executed locally.
pub const REMOTE_TABLE_SQL: &str = r#"-- 1. Table
create table if not exists public.patients (
  id uuid not null default gen_random_uuid(),
  created_at timestamp with time zone not null default now(),
  name text not null,
  treatment text not null,
  status text not null,
  primary key (id)
);

-- 2. Realtime
alter publication supabase_realtime add table public.patients;

-- 3. Open access (trusted network only)
alter table public.patients enable row level security;
create policy "Enable all access" on public.patients
  for all using (true) with check (true);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_create_blobs_table_structure() {
        assert!(CREATE_BLOBS_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_BLOBS_TABLE.contains("value TEXT NOT NULL"));
    }

    #[test]
    fn test_create_metadata_table_structure() {
        assert!(CREATE_METADATA_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_METADATA_TABLE.contains("value TEXT NOT NULL"));
    }

    #[test]
    fn test_remote_table_sql_has_required_columns() {
        for column in ["id uuid", "created_at", "name text", "treatment text", "status text"] {
            assert!(REMOTE_TABLE_SQL.contains(column), "missing {column}");
        }
        assert!(REMOTE_TABLE_SQL.contains("supabase_realtime"));
    }
}
