//! Example business action: list the tables of the LimeSurvey database.
//!
//! Replace [`process`] with the statements you actually need.

use db::{Backend, FetchMode, Session};
use error::DatabaseError;

pub const TABLE_LIST_HEADING: &str = "List of tables in the LimeSurvey DB";

/// Names of all tables, in the order the server returns them.
pub async fn list_tables<B: Backend>(session: &mut Session<B>) -> Result<Vec<String>, DatabaseError> {
    let result = session.execute("SHOW TABLES", FetchMode::Numeric).await?;
    Ok(result
        .into_rows()
        .into_iter()
        .filter_map(|row| row.get(0).map(|value| value.to_string()))
        .collect())
}

/// Render table names as an HTML ordered list under a heading.
pub fn render_table_list(tables: &[String]) -> String {
    let mut html = format!("<h2>{}</h2><ol>", TABLE_LIST_HEADING);
    for table in tables {
        html.push_str(&format!("<li>{}</li>", escape_html(table)));
    }
    html.push_str("</ol>");
    html
}

/// Run the business action on a connected session.
pub async fn process<B: Backend>(session: &mut Session<B>) -> Result<String, DatabaseError> {
    let tables = list_tables(session).await?;
    tracing::info!("Found {} table(s)", tables.len());
    Ok(render_table_list(&tables))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
