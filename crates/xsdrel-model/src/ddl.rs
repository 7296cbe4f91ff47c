//! DDL emitter (spec.md §4.4): renders `CREATE TABLE` / FK / UNIQUE / CHECK /
//! INDEX statements for a SQL Server target.

use crate::ident::qualify;
use crate::model::{Column, Model, Table};

/// Render the full provisioning script for `model`, in the fixed order
/// spec.md §4.4 lists: tables, foreign keys, FK indexes, uniques, unique
/// lookup indexes, checks. Building the same [`Model`] twice and calling
/// this function twice yields byte-identical output (spec.md §8 property 1),
/// since nothing here depends on iteration order over a hash map.
pub fn emit_ddl(model: &Model) -> String {
    let mut out = String::new();

    for table in &model.tables {
        out.push_str(&create_table_sql(table));
        out.push_str("\nGO\n\n");
    }

    for table in &model.tables {
        for fk in &table.foreign_keys {
            out.push_str(&format!(
                "ALTER TABLE {} ADD CONSTRAINT [{}] FOREIGN KEY ([{}]) REFERENCES {} ([{}]);\n",
                table.qualified_name(),
                fk.name,
                fk.column_name,
                qualify(&fk.ref_schema, &fk.ref_table),
                fk.ref_column,
            ));
        }
    }
    out.push_str("GO\n\n");

    for table in &model.tables {
        for fk in &table.foreign_keys {
            out.push_str(&format!(
                "CREATE INDEX [IX_{}_{}] ON {} ([{}]);\n",
                table.name,
                fk.column_name,
                table.qualified_name(),
                fk.column_name,
            ));
        }
    }
    out.push_str("GO\n\n");

    for table in &model.tables {
        for uq in &table.uniques {
            let cols = uq.columns.iter().map(|c| format!("[{c}]")).collect::<Vec<_>>().join(", ");
            out.push_str(&format!(
                "ALTER TABLE {} ADD CONSTRAINT [{}] UNIQUE ({});\n",
                table.qualified_name(),
                uq.name,
                cols,
            ));
        }
    }
    out.push_str("GO\n\n");

    for table in &model.tables {
        for uq in &table.uniques {
            if uq.columns.len() < 2 {
                continue;
            }
            let index_name = format!("IX_{}_{}_Lookup", table.name, uq.columns.join("_"));
            let cols = uq.columns.iter().map(|c| format!("[{c}]")).collect::<Vec<_>>().join(", ");
            out.push_str(&format!(
                "CREATE NONCLUSTERED INDEX [{}] ON {} ({}) INCLUDE ([{}]);\n",
                index_name,
                table.qualified_name(),
                cols,
                table.pk_name(),
            ));
        }
    }
    out.push_str("GO\n\n");

    for table in &model.tables {
        for check in &table.checks {
            out.push_str(&format!(
                "ALTER TABLE {} ADD CONSTRAINT [{}] CHECK ({});\n",
                table.qualified_name(),
                check.name,
                check.expression,
            ));
        }
    }
    out.push_str("GO\n");

    out
}

fn create_table_sql(table: &Table) -> String {
    let mut lines = Vec::with_capacity(table.columns.len());
    for col in &table.columns {
        lines.push(format!("    {}", column_sql(col)));
    }

    format!(
        "CREATE TABLE {} (\n{}\n);",
        table.qualified_name(),
        lines.join(",\n"),
    )
}

fn column_sql(col: &Column) -> String {
    let mut parts = vec![format!("[{}]", col.name), col.sql_type.to_string()];

    if col.identity {
        parts.push("IDENTITY(1,1)".to_string());
    }

    parts.push(if col.nullable { "NULL".to_string() } else { "NOT NULL".to_string() });

    if col.is_primary_key {
        parts.push("PRIMARY KEY".to_string());
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_model;

    const MINIMAL_XSD: &str = r#"<?xml version="1.0"?>
    <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:element name="Root">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="Item" maxOccurs="unbounded">
              <xs:complexType>
                <xs:sequence>
                  <xs:element name="Code" type="xs:string"/>
                  <xs:element name="Amount" type="xs:decimal"/>
                </xs:sequence>
                <xs:attribute name="id" use="required">
                  <xs:simpleType>
                    <xs:restriction base="xs:ID"/>
                  </xs:simpleType>
                </xs:attribute>
              </xs:complexType>
            </xs:element>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    #[test]
    fn s1_minimal_schema_ddl() {
        let model = build_model(MINIMAL_XSD, "xsd").expect("build model");
        let ddl = emit_ddl(&model);
        assert!(ddl.contains("CREATE TABLE [xsd].[Root]"));
        assert!(ddl.contains("CREATE TABLE [xsd].[RootItem]"));
        assert!(ddl.contains("FK_RootItem_Root"));
        assert!(ddl.contains("UNIQUE ([Id])"));
    }

    #[test]
    fn ddl_is_deterministic_across_rebuilds() {
        let m1 = build_model(MINIMAL_XSD, "xsd").unwrap();
        let m2 = build_model(MINIMAL_XSD, "xsd").unwrap();
        assert_eq!(emit_ddl(&m1), emit_ddl(&m2));
    }

    #[test]
    fn pk_is_first_column_and_fk_is_second() {
        let model = build_model(MINIMAL_XSD, "xsd").expect("build model");
        let item = model.table_by_name("RootItem").unwrap();
        assert!(item.columns[0].is_primary_key);
        assert_eq!(item.columns[1].name, "RootId");
    }
}
