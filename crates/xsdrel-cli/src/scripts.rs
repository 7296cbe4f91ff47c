//! Administrative script renderers that sit outside the core DDL emitter:
//! convenience views, drop/clear scripts, row samples, and an optional seed
//! script. These read a [`Model`] the same way `xsdrel_model::emit_ddl`
//! does, but they describe reads and teardown, not the provisioning DDL
//! itself, so they live in the CLI rather than the model crate.

use xsdrel_model::Model;

/// `CREATE VIEW [schema].[vw_Table] AS SELECT * FROM [schema].[Table];` for
/// every table, giving a flat read surface without exposing the physical
/// naming to downstream reporting tools.
pub fn render_views(model: &Model) -> String {
    let mut out = String::new();
    for table in &model.tables {
        out.push_str(&format!(
            "CREATE OR ALTER VIEW [{}].[vw_{}] AS SELECT * FROM {};\nGO\n\n",
            model.schema,
            table.name,
            table.qualified_name(),
        ));
    }
    out
}

/// `DROP TABLE` in reverse dependency order (children before parents) so
/// foreign keys never block the drop; tables are declared in parent-first
/// order by the builder, so dropping in reverse is always dependency-safe.
pub fn render_drop(model: &Model) -> String {
    let mut out = String::new();
    for table in model.tables.iter().rev() {
        out.push_str(&format!("DROP TABLE IF EXISTS {};\nGO\n", table.qualified_name()));
    }
    out
}

/// `DELETE FROM` every table, children first, for wiping data between test
/// runs without dropping the schema.
pub fn render_clear(model: &Model) -> String {
    let mut out = String::new();
    for table in model.tables.iter().rev() {
        out.push_str(&format!("DELETE FROM {};\nGO\n", table.qualified_name()));
    }
    out
}

/// `SELECT TOP 10 * FROM [schema].[Table];` for every table, a quick
/// sanity-check script to run against a freshly provisioned schema.
pub fn render_samples(model: &Model) -> String {
    let mut out = String::new();
    for table in &model.tables {
        out.push_str(&format!("SELECT TOP 10 * FROM {};\nGO\n\n", table.qualified_name()));
    }
    out
}

/// One `INSERT ... DEFAULT VALUES` per table with no columns beyond its
/// primary key (so running it is always safe regardless of NOT NULL
/// columns elsewhere), seeding an empty schema with its default rows.
pub fn render_seed(model: &Model) -> String {
    let mut out = String::new();
    for table in &model.tables {
        if table.columns.len() == 1 {
            out.push_str(&format!("INSERT INTO {} DEFAULT VALUES;\n", table.qualified_name()));
        }
    }
    out
}

/// A minimal, one-row-per-table example XML instance rooted at the table
/// with no parent foreign key, for users checking that a hand-authored
/// instance document has the shape the model expects. Not a fuzzer or a
/// generator of valid content — just the element nesting.
pub fn render_example_xml(model: &Model) -> String {
    let root = model
        .tables
        .iter()
        .find(|t| t.foreign_keys.is_empty())
        .unwrap_or_else(|| &model.tables[0]);
    let mut out = String::from("<?xml version=\"1.0\"?>\n");
    write_example_element(model, root, &mut out, 0);
    out
}

fn write_example_element(model: &Model, table: &xsdrel_model::Table, out: &mut String, depth: usize) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!("{indent}<{}>\n", table.name));
    for col in &table.columns {
        if col.is_primary_key || table.foreign_keys.iter().any(|fk| fk.column_name == col.name) {
            continue;
        }
        out.push_str(&format!("{indent}  <{}>...</{}>\n", col.name, col.name));
    }
    for child in &model.tables {
        if child.foreign_keys.iter().any(|fk| fk.ref_table == table.name) {
            write_example_element(model, child, out, depth + 1);
        }
    }
    out.push_str(&format!("{indent}</{}>\n", table.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use xsdrel_model::build_model;

    const XSD: &str = r#"<?xml version="1.0"?>
    <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="Root">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="Label" type="xs:string"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    #[test]
    fn views_cover_every_table() {
        let model = build_model(XSD, "xsd").unwrap();
        let views = render_views(&model);
        assert!(views.contains("vw_Root"));
    }

    #[test]
    fn drop_and_clear_list_tables_children_first() {
        let model = build_model(XSD, "xsd").unwrap();
        assert!(render_drop(&model).contains("DROP TABLE IF EXISTS [xsd].[Root]"));
        assert!(render_clear(&model).contains("DELETE FROM [xsd].[Root]"));
    }
}
