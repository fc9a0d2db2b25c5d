//! Catalog command for listing bindable work orders and activities.

use std::io::Write;

use anyhow::Result;
use wt_core::{ActivityInfo, ActivityRef, StaticCatalog};

fn write_item<W: Write>(out: &mut W, reference: &ActivityRef, info: &ActivityInfo) -> Result<()> {
    let reference = reference.to_string();
    write!(out, "  {reference:<16}  {}", info.title)?;
    if !info.category.is_empty() {
        write!(out, " [{}]", info.category)?;
    }
    if info.billable {
        write!(out, ", billable at {}/h", info.rate)?;
    }
    writeln!(out)?;
    Ok(())
}

/// Writes the catalog grouped by kind.
pub fn write_catalog<W: Write>(out: &mut W, catalog: &StaticCatalog) -> Result<()> {
    if catalog.is_empty() {
        writeln!(out, "Catalog is empty.")?;
        writeln!(out)?;
        writeln!(out, "Hint: set catalog_path in config.toml to a JSON catalog file.")?;
        return Ok(());
    }

    writeln!(out, "WORK ORDERS")?;
    for item in &catalog.work_orders {
        write_item(out, &ActivityRef::WorkOrder(item.id.clone()), &item.info)?;
    }
    writeln!(out, "ACTIVITIES")?;
    for item in &catalog.activities {
        write_item(out, &ActivityRef::QuickActivity(item.id.clone()), &item.info)?;
    }
    writeln!(out)?;
    writeln!(out, "Tip: use 'bind <ref>' in 'wt run', or 'bind other:<reason>'.")?;
    Ok(())
}

/// Runs the catalog command.
pub fn run<W: Write>(out: &mut W, catalog: &StaticCatalog) -> Result<()> {
    write_catalog(out, catalog)
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    fn render(catalog: &StaticCatalog) -> String {
        let mut out = Vec::new();
        run(&mut out, catalog).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_catalog_empty() {
        assert!(render(&StaticCatalog::default()).starts_with("Catalog is empty."));
    }

    #[test]
    fn test_catalog_listing() {
        let catalog: StaticCatalog = serde_json::from_str(
            r#"{
                "work_orders": [
                    {"id": "WO-1042", "title": "Replace conveyor belt", "billable": true, "rate": "500", "category": "maintenance"}
                ],
                "activities": [
                    {"id": "travel", "title": "Travel", "category": "logistics"},
                    {"id": "training", "title": "Training"}
                ]
            }"#,
        )
        .unwrap();

        assert_snapshot!(render(&catalog), @r"
        WORK ORDERS
          wo:WO-1042        Replace conveyor belt [maintenance], billable at 500/h
        ACTIVITIES
          qa:travel         Travel [logistics]
          qa:training       Training

        Tip: use 'bind <ref>' in 'wt run', or 'bind other:<reason>'.
        ");
    }
}
