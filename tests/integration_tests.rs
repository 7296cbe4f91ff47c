//! End-to-end scenarios across the derivation, import, and daemon crates.
//!
//! These exercise the scenarios S1-S6 and the testable properties against
//! the whole pipeline (XSD text in, DDL/rows out) rather than any single
//! crate's unit tests.

use xsdrel_daemon::RemoteMirror;
use xsdrel_import::{ImportOptions, Importer, MemoryExecutor, Value};
use xsdrel_model::{build_model, emit_ddl};

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

const S2_XML: &str = r#"<Root>
  <Item id="i1"><Code>A</Code><Amount>1.23</Amount></Item>
  <Item id="i2"><Code>B</Code><Amount>2.00</Amount></Item>
</Root>"#;

#[test]
fn s1_minimal_schema_produces_expected_ddl() {
    let model = build_model(S1_XSD, "xsd").expect("build model");
    let ddl = emit_ddl(&model);

    assert!(ddl.contains("CREATE TABLE [xsd].[Root]"));
    assert!(ddl.contains("CREATE TABLE [xsd].[RootItem]"));
    assert!(ddl.contains("UNIQUE ([Id])"));
    assert!(ddl.contains("FK_RootItem_Root"));
}

#[test]
fn ddl_is_byte_identical_across_rebuilds() {
    let m1 = build_model(S1_XSD, "xsd").unwrap();
    let m2 = build_model(S1_XSD, "xsd").unwrap();
    assert_eq!(emit_ddl(&m1), emit_ddl(&m2));
}

#[tokio::test]
async fn s2_and_s3_import_then_reimport_is_idempotent() {
    let model = build_model(S1_XSD, "xsd").expect("build model");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s2.xml");
    std::fs::write(&path, S2_XML).unwrap();
    let mut executor = MemoryExecutor::new();

    let importer = Importer::new(&model, ImportOptions::default());
    let first = importer.import_file(&path, &mut executor).await.expect("first import");
    assert_eq!(first.per_table.get("Root").copied(), Some(1));
    assert_eq!(first.per_table.get("RootItem").copied(), Some(2));
    assert_eq!(first.total_rows, 3);
    assert_eq!(executor.row_count("xsd", "RootItem"), 2);

    let second = importer.import_file(&path, &mut executor).await.expect("second import");
    assert_eq!(second.total_rows, 0, "re-import of an unchanged document must net zero new rows");
    assert_eq!(executor.row_count("xsd", "RootItem"), 2);
}

const S4_XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="Root">
    <xs:complexType>
      <xs:choice>
        <xs:element name="A" type="xs:string"/>
        <xs:element name="B" type="xs:string"/>
      </xs:choice>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[tokio::test]
async fn s4_choice_element_sets_discriminator_columns() {
    let model = build_model(S4_XSD, "xsd").expect("build model");
    let root = model.table_by_name("Root").expect("Root table");
    assert!(root.has_column("ChoiceOption"));
    let a = model.table_by_name("RootA").expect("RootA table");
    assert!(a.has_column("ChoiceParentOption"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s4.xml");
    std::fs::write(&path, "<Root><A>hello</A></Root>").unwrap();
    let mut executor = MemoryExecutor::new();
    let importer = Importer::new(&model, ImportOptions::default());
    importer.import_file(&path, &mut executor).await.expect("import");

    let root_rows = executor.rows("xsd", "Root");
    assert_eq!(root_rows.len(), 1);
    assert_eq!(root_rows[0].get("ChoiceOption"), Some(&Value::Text("A".to_string())));

    let a_rows = executor.rows("xsd", "RootA");
    assert_eq!(a_rows.len(), 1);
    assert_eq!(a_rows[0].get("ChoiceParentOption"), Some(&Value::Text("A".to_string())));
    assert_eq!(executor.row_count("xsd", "RootB"), 0);
}

const S5_XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="Root">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="K" minOccurs="0">
          <xs:simpleType>
            <xs:restriction base="xs:string">
              <xs:length value="8"/>
            </xs:restriction>
          </xs:simpleType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[test]
fn s5_length_facet_produces_len_check_constraint() {
    let model = build_model(S5_XSD, "xsd").expect("build model");
    let ddl = emit_ddl(&model);
    assert!(ddl.contains("CHECK ([K] IS NULL OR (LEN([K]) = 8))"), "ddl was:\n{ddl}");
}

#[tokio::test]
async fn s6_remote_backlog_copies_once_then_nothing_on_restart() {
    let remote_dir = tempfile::tempdir().unwrap();
    let local_root = tempfile::tempdir().unwrap();
    let in_dir = local_root.path().join("in");
    std::fs::create_dir_all(&in_dir).unwrap();
    let history = local_root.path().join("remote_copied_files.txt");

    std::fs::write(remote_dir.path().join("a.xml"), "<Root/>").unwrap();
    std::fs::write(remote_dir.path().join("b.xml"), "<Root/>").unwrap();

    let sink = xsdrel_daemon::ObservabilitySink::configure(local_root.path(), false);

    let mirror = RemoteMirror::new(remote_dir.path(), &in_dir, &history);
    assert!(mirror.poll_once(&sink).await);
    assert!(in_dir.join("a.xml").exists());
    assert!(in_dir.join("b.xml").exists());

    let mirror_after_restart = RemoteMirror::new(remote_dir.path(), &in_dir, &history);
    assert!(!mirror_after_restart.poll_once(&sink).await, "already-seen files must not be re-copied after a restart");
}
