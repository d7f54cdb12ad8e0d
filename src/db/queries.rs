//! SQL query constants and builders
//!
//! Contains all SQL queries used by the relay. Catalog queries are read-only; the snapshot
//! table name is validated as a plain identifier before it is spliced into the builders below.

/// Does a base or partitioned table exist
pub const TABLE_EXISTS: &str = r#"
    SELECT EXISTS (
        SELECT 1
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
          AND c.relname = $2
          AND c.relkind IN ('r', 'p')
    ) AS present
"#;

/// Column name, formatted type, nullability and default expression in declaration order
pub const GET_COLUMNS: &str = r#"
    SELECT
        a.attname::text AS column_name,
        pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
        NOT a.attnotnull AS nullable,
        pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS column_default
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
    WHERE n.nspname = $1
      AND c.relname = $2
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

/// Table constraints rendered by the server
pub const GET_CONSTRAINTS: &str = r#"
    SELECT
        con.conname::text AS constraint_name,
        pg_catalog.pg_get_constraintdef(con.oid, true) AS definition
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relname = $2
    ORDER BY
        CASE con.contype WHEN 'p' THEN 0 WHEN 'u' THEN 1 WHEN 'f' THEN 2 ELSE 3 END,
        con.conname
"#;

/// Indexes that are not already implied by a constraint
pub const GET_INDEXES: &str = r#"
    SELECT i.indexdef AS definition
    FROM pg_catalog.pg_indexes i
    WHERE i.schemaname = $1
      AND i.tablename = $2
      AND NOT EXISTS (
          SELECT 1
          FROM pg_catalog.pg_constraint con
          JOIN pg_catalog.pg_namespace n ON n.oid = con.connamespace
          WHERE n.nspname = i.schemaname
            AND con.conname = i.indexname
      )
    ORDER BY i.indexname
"#;

/// User-defined triggers
pub const GET_TRIGGERS: &str = r#"
    SELECT pg_catalog.pg_get_triggerdef(t.oid, true) AS definition
    FROM pg_catalog.pg_trigger t
    JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relname = $2
      AND NOT t.tgisinternal
    ORDER BY t.tgname
"#;

/// Live base tables in one schema
pub const LIST_TABLES: &str = r#"
    SELECT c.relname::text AS table_name
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relkind IN ('r', 'p')
      AND NOT c.relispartition
    ORDER BY c.relname
"#;

pub fn create_snapshot_table(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            table_name TEXT PRIMARY KEY,
            columns_data JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            raw_sql TEXT NOT NULL DEFAULT '',
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#
    )
}

pub fn get_snapshot(table: &str) -> String {
    format!("SELECT table_name, columns_data, raw_sql, updated_at FROM {table} WHERE table_name = $1")
}

pub fn upsert_snapshot(table: &str) -> String {
    format!(
        r#"
        INSERT INTO {table} (table_name, columns_data, raw_sql, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (table_name) DO UPDATE
        SET columns_data = EXCLUDED.columns_data,
            raw_sql = EXCLUDED.raw_sql,
            updated_at = EXCLUDED.updated_at
        "#
    )
}

pub fn delete_snapshot(table: &str) -> String {
    format!("DELETE FROM {table} WHERE table_name = $1")
}

pub fn list_snapshot_names(table: &str) -> String {
    format!("SELECT table_name FROM {table} ORDER BY table_name")
}

/// Event trigger publishing table DDL on `channel`.
///
/// `ddl_command_end` covers CREATE/ALTER; dropped objects are only visible from `sql_drop`.
pub fn install_schema_triggers(channel: &str) -> String {
    format!(
        r#"
        CREATE OR REPLACE FUNCTION schema_relay_notify_ddl() RETURNS event_trigger
        LANGUAGE plpgsql AS $fn$
        DECLARE
            obj record;
        BEGIN
            FOR obj IN SELECT * FROM pg_event_trigger_ddl_commands()
                WHERE command_tag IN ('CREATE TABLE', 'ALTER TABLE')
            LOOP
                PERFORM pg_notify('{channel}', json_build_object(
                    'command_tag', obj.command_tag,
                    'object_identity', obj.object_identity,
                    'object_type', obj.object_type
                )::text);
            END LOOP;
        END;
        $fn$;

        CREATE OR REPLACE FUNCTION schema_relay_notify_drop() RETURNS event_trigger
        LANGUAGE plpgsql AS $fn$
        DECLARE
            obj record;
        BEGIN
            FOR obj IN SELECT * FROM pg_event_trigger_dropped_objects()
                WHERE object_type = 'table' AND original
            LOOP
                PERFORM pg_notify('{channel}', json_build_object(
                    'command_tag', 'DROP TABLE',
                    'object_identity', obj.object_identity,
                    'object_type', obj.object_type
                )::text);
            END LOOP;
        END;
        $fn$;

        DROP EVENT TRIGGER IF EXISTS schema_relay_ddl;
        CREATE EVENT TRIGGER schema_relay_ddl ON ddl_command_end
            WHEN TAG IN ('CREATE TABLE', 'ALTER TABLE')
            EXECUTE FUNCTION schema_relay_notify_ddl();

        DROP EVENT TRIGGER IF EXISTS schema_relay_drop;
        CREATE EVENT TRIGGER schema_relay_drop ON sql_drop
            WHEN TAG IN ('DROP TABLE')
            EXECUTE FUNCTION schema_relay_notify_drop();
        "#
    )
}

/// Row trigger function shared by every monitored table
pub fn install_row_notify_function(channel: &str) -> String {
    format!(
        r#"
        CREATE OR REPLACE FUNCTION schema_relay_notify_row() RETURNS trigger
        LANGUAGE plpgsql AS $fn$
        BEGIN
            PERFORM pg_notify('{channel}', json_build_object(
                'table', TG_TABLE_NAME,
                'data', row_to_json(NEW)
            )::text);
            RETURN NEW;
        END;
        $fn$;
        "#
    )
}

/// Attach the row trigger to one table (`quoted_table` must already be a quoted identifier)
pub fn install_row_trigger(quoted_table: &str) -> String {
    format!(
        r#"
        DROP TRIGGER IF EXISTS schema_relay_row_insert ON {quoted_table};
        CREATE TRIGGER schema_relay_row_insert
            AFTER INSERT ON {quoted_table}
            FOR EACH ROW EXECUTE FUNCTION schema_relay_notify_row();
        "#
    )
}
