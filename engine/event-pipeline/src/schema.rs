//! Warehouse table definitions
//!
//! Column names match the enriched event rows, so a sub-batch insert can take
//! its column list straight from the row keys.

use crate::events::EventKind;

const COMMON_COLUMNS: &str = "\
    session_id VARCHAR(255) NOT NULL,
    user_id VARCHAR(255),
    page_url VARCHAR(2048),
    \"timestamp\" TIMESTAMP NOT NULL,
    user_agent VARCHAR(1024),
    ip_address VARCHAR(45),
    browser VARCHAR(100),
    os VARCHAR(100),
    device_type VARCHAR(50),
    country VARCHAR(100),
    city VARCHAR(100),
    referrer VARCHAR(2048),";

fn kind_columns(kind: EventKind) -> &'static str {
    match kind {
        EventKind::PageView => {
            "\
    page_title VARCHAR(1024),
    load_time INTEGER,"
        }
        EventKind::Click => {
            "\
    element_id VARCHAR(255),
    element_text VARCHAR(1024),
    click_x INTEGER,
    click_y INTEGER,"
        }
        EventKind::Scroll => {
            "\
    scroll_depth INTEGER,
    scroll_percentage DECIMAL(5,2),"
        }
        EventKind::Session => {
            "\
    event_type VARCHAR(50) NOT NULL,
    duration INTEGER,
    page_count INTEGER,"
        }
    }
}

/// `CREATE TABLE IF NOT EXISTS` for one kind, distributed and sorted by session
pub fn create_table_statement(schema: &str, kind: EventKind) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {schema}.{table} (\n{common}\n{specific}\n    created_at TIMESTAMP DEFAULT GETDATE()\n)\nDISTSTYLE KEY\nDISTKEY (session_id)\nSORTKEY (\"timestamp\", session_id)",
        table = kind.table_name(),
        common = COMMON_COLUMNS,
        specific = kind_columns(kind),
    )
}

/// Statements for every event table, in processing order
pub fn create_table_statements(schema: &str) -> Vec<String> {
    EventKind::ALL.iter().map(|kind| create_table_statement(schema, *kind)).collect()
}
