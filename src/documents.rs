//! Document listing for the CLI (`kc documents`).

use anyhow::Result;

use knowledge_center_core::models::DocumentSummary;
use knowledge_center_core::repository::list_documents;

use crate::config::Config;
use crate::services::AppServices;

/// CLI entry point: lists documents, newest first.
pub async fn run_list_documents(config: &Config, json: bool) -> Result<()> {
    let services = AppServices::from_config(config)?;
    let docs = list_documents(services.store.as_ref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in &docs {
        println!("{}", format_row(doc));
    }
    println!();
    println!("{} document(s)", docs.len());
    Ok(())
}

fn format_row(doc: &DocumentSummary) -> String {
    let mut row = format!(
        "{}  v{}  {}  ({} elements, uploaded {})",
        doc.id,
        doc.version,
        doc.display_name,
        doc.element_count,
        doc.uploaded_at.format("%Y-%m-%d %H:%M")
    );
    if !doc.category.is_empty() {
        row.push_str(&format!("  [{}]", doc.category));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use knowledge_center_core::models::Document;

    #[test]
    fn test_format_row() {
        let mut doc = Document::new("doc::1", "a.pdf");
        doc.display_name = "Leave Policy".to_string();
        doc.version = 2;
        doc.element_count = 14;
        doc.uploaded_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        doc.category = "HR".to_string();
        assert_eq!(
            format_row(&doc.summary()),
            "doc::1  v2  Leave Policy  (14 elements, uploaded 2026-03-01 09:30)  [HR]"
        );
    }
}
