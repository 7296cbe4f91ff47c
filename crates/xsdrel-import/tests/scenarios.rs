//! End-to-end importer scenarios straight from spec.md §8, driven against
//! [`MemoryExecutor`] since no live SQL Server is available in this harness.

use xsdrel_import::{ImportError, ImportOptions, Importer, MemoryExecutor, SqlExecutor, Value};
use xsdrel_model::build_model;

/// Wraps [`MemoryExecutor`], succeeding normally until `fail_after` inserts
/// have happened, then erroring — used to exercise the rollback path
/// (spec.md §8 property 5) without a live database.
struct FlakyExecutor {
    inner: MemoryExecutor,
    inserts_remaining: u32,
}

#[async_trait::async_trait]
impl SqlExecutor for FlakyExecutor {
    async fn begin(&mut self) -> xsdrel_import::Result<()> {
        self.inner.begin().await
    }
    async fn commit(&mut self) -> xsdrel_import::Result<()> {
        self.inner.commit().await
    }
    async fn rollback(&mut self) -> xsdrel_import::Result<()> {
        self.inner.rollback().await
    }
    async fn probe(&mut self, schema: &str, table: &str, pk_column: &str, columns: &[(String, Value)]) -> xsdrel_import::Result<Option<i64>> {
        self.inner.probe(schema, table, pk_column, columns).await
    }
    async fn insert(&mut self, schema: &str, table: &str, columns: &[(String, Value)]) -> xsdrel_import::Result<i64> {
        if self.inserts_remaining == 0 {
            return Err(ImportError::Database("simulated failure".to_string()));
        }
        self.inserts_remaining -= 1;
        self.inner.insert(schema, table, columns).await
    }
    async fn insert_default(&mut self, schema: &str, table: &str) -> xsdrel_import::Result<i64> {
        self.inner.insert_default(schema, table).await
    }
}

const S1_XSD: &str = r#"<?xml version="1.0"?>
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

const S2_XML: &str = r#"<Root><Item id="i1"><Code>A</Code><Amount>1.23</Amount></Item><Item id="i2"><Code>B</Code><Amount>2.00</Amount></Item></Root>"#;

#[tokio::test]
async fn s2_import_tiny_xml() {
    let model = build_model(S1_XSD, "xsd").expect("build model");
    let importer = Importer::new(&model, ImportOptions::default());
    let mut executor = MemoryExecutor::new();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s2.xml");
    std::fs::write(&path, S2_XML).unwrap();

    let result = importer.import_file(&path, &mut executor).await.expect("import succeeds");

    assert_eq!(result.per_table.get("Root"), Some(&1));
    assert_eq!(result.per_table.get("RootItem"), Some(&2));
    assert_eq!(result.total_rows, 3);
    assert_eq!(executor.row_count("xsd", "RootItem"), 2);

    let root_id = match executor.rows("xsd", "Root")[0].get("RootId") {
        Some(xsdrel_import::Value::Int(id)) => *id,
        other => panic!("expected RootId, got {other:?}"),
    };
    for row in executor.rows("xsd", "RootItem") {
        assert_eq!(row.get("RootId"), Some(&xsdrel_import::Value::Int(root_id)));
    }
}

#[tokio::test]
async fn s3_reimport_is_idempotent() {
    let model = build_model(S1_XSD, "xsd").expect("build model");
    let importer = Importer::new(&model, ImportOptions::default());
    let mut executor = MemoryExecutor::new();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s3.xml");
    std::fs::write(&path, S2_XML).unwrap();

    importer.import_file(&path, &mut executor).await.expect("first import succeeds");
    let second = importer.import_file(&path, &mut executor).await.expect("second import succeeds");

    assert_eq!(second.total_rows, 0);
    assert_eq!(executor.row_count("xsd", "RootItem"), 2);
}

const S4_XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="Root">
    <xs:complexType>
      <xs:choice>
        <xs:element name="A">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="Value" type="xs:string"/>
            </xs:sequence>
          </xs:complexType>
        </xs:element>
        <xs:element name="B">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="Value" type="xs:string"/>
            </xs:sequence>
          </xs:complexType>
        </xs:element>
      </xs:choice>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[tokio::test]
async fn s4_choice_sets_discriminators() {
    let model = build_model(S4_XSD, "xsd").expect("build model");
    let importer = Importer::new(&model, ImportOptions::default());
    let mut executor = MemoryExecutor::new();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s4.xml");
    std::fs::write(&path, "<Root><A><Value>hi</Value></A></Root>").unwrap();

    importer.import_file(&path, &mut executor).await.expect("import succeeds");

    let root_row = &executor.rows("xsd", "Root")[0];
    assert_eq!(root_row.get("ChoiceOption"), Some(&xsdrel_import::Value::Text("A".to_string())));

    let branch_row = &executor.rows("xsd", "RootA")[0];
    assert_eq!(branch_row.get("ChoiceParentOption"), Some(&xsdrel_import::Value::Text("A".to_string())));
    assert_eq!(executor.row_count("xsd", "RootB"), 0);
}

#[tokio::test]
async fn import_backfills_not_null_columns_with_no_bound_value() {
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

    let model = build_model(XSD, "xsd").expect("build model");
    let importer = Importer::new(&model, ImportOptions::default());
    let mut executor = MemoryExecutor::new();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backfill.xml");
    std::fs::write(&path, "<Root></Root>").unwrap();

    importer.import_file(&path, &mut executor).await.expect("import succeeds");

    let row = &executor.rows("xsd", "Root")[0];
    assert_eq!(row.get("Label"), Some(&xsdrel_import::Value::Text(String::new())));
}

#[tokio::test]
async fn malformed_xml_is_rejected_before_any_write() {
    let model = build_model(S1_XSD, "xsd").expect("build model");
    let importer = Importer::new(&model, ImportOptions::default());
    let mut executor = MemoryExecutor::new();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("malformed.xml");
    std::fs::write(&path, "<Root><Item id=\"i1\"><Code>A</Code><Amount>1.23</Amount></Item><Unclosed>").unwrap();

    let result = importer.import_file(&path, &mut executor).await;
    assert!(result.is_err());
    assert_eq!(executor.row_count("xsd", "Root"), 0);
    assert_eq!(executor.row_count("xsd", "RootItem"), 0);
}

#[tokio::test]
async fn failed_import_rolls_back_earlier_inserts_in_the_same_file() {
    let model = build_model(S1_XSD, "xsd").expect("build model");
    let importer = Importer::new(&model, ImportOptions::default());
    let mut executor = FlakyExecutor {
        inner: MemoryExecutor::new(),
        // Root inserts fine; the first RootItem insert fails.
        inserts_remaining: 1,
    };

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s2.xml");
    std::fs::write(&path, S2_XML).unwrap();

    let result = importer.import_file(&path, &mut executor).await;
    assert!(result.is_err());
    assert_eq!(executor.inner.row_count("xsd", "Root"), 0);
    assert_eq!(executor.inner.row_count("xsd", "RootItem"), 0);
}
