use ws_policy_core::{SchemaCollection, SchemaDocument, ViolationReason};

const ADDRESS: &str = r#"<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:tns="urn:example:address" targetNamespace="urn:example:address"
    elementFormDefault="qualified">
  <xsd:complexType name="Address">
    <xsd:sequence>
      <xsd:element name="street" type="xsd:string"/>
      <xsd:element name="country" type="tns:Country"/>
    </xsd:sequence>
  </xsd:complexType>
  <xsd:simpleType name="Country">
    <xsd:restriction base="xsd:string"><xsd:length value="2"/></xsd:restriction>
  </xsd:simpleType>
  <xsd:attributeGroup name="audit">
    <xsd:attribute name="createdBy" type="xsd:string"/>
  </xsd:attributeGroup>
</xsd:schema>"#;

const PERSON: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
    xmlns:a="urn:example:address" xmlns:o="urn:example:order"
    targetNamespace="urn:example:person">
  <xs:complexType name="Person">
    <xs:sequence>
      <xs:element name="home" type="a:Address"/>
      <xs:element ref="o:order" minOccurs="0" maxOccurs="unbounded"/>
    </xs:sequence>
    <xs:attributeGroup ref="a:audit"/>
  </xs:complexType>
</xs:schema>"#;

const ORDER: &str = r#"<schema xmlns="http://www.w3.org/2001/XMLSchema"
    xmlns:p="urn:example:person" targetNamespace="urn:example:order">
  <annotation><documentation>Orders reference buyers.</documentation></annotation>
  <element name="order">
    <complexType>
      <complexContent>
        <extension base="p:Person"/>
      </complexContent>
    </complexType>
  </element>
</schema>"#;

fn collection() -> SchemaCollection {
    let mut schemas = SchemaCollection::new();
    for text in [ADDRESS, PERSON, ORDER] {
        schemas.add_text(text).unwrap();
    }
    schemas
}

#[test]
fn cross_import_repair_makes_collection_valid() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut schemas = collection();

    let err = schemas.validate().unwrap_err();
    assert!(err
        .violations()
        .iter()
        .all(|v| v.reason == ViolationReason::MissingImport));
    assert_eq!(err.violations().len(), 4);

    assert_eq!(schemas.add_cross_imports(), 3);
    schemas.validate().unwrap();

    assert_eq!(schemas.add_cross_imports(), 0);
    assert_eq!(
        schemas.get("urn:example:person").unwrap().imports(),
        vec!["urn:example:address", "urn:example:order"]
    );
    assert_eq!(
        schemas.get("urn:example:order").unwrap().imports(),
        vec!["urn:example:person"]
    );
    assert!(schemas.get("urn:example:address").unwrap().imports().is_empty());
}

#[test]
fn repaired_documents_survive_serialization() {
    let mut schemas = collection();
    schemas.add_cross_imports();

    let mut reparsed = SchemaCollection::new();
    for doc in schemas.documents() {
        let text = doc.to_xml_string();
        reparsed.add(SchemaDocument::parse(&text).unwrap()).unwrap();
    }
    reparsed.validate().unwrap();
    assert_eq!(reparsed.add_cross_imports(), 0);

    // Default-namespace schemas get an unprefixed import after the annotation.
    let order = reparsed.get("urn:example:order").unwrap().to_xml_string();
    let annotation = order.find("<annotation>").unwrap();
    let import = order.find(r#"<import namespace="urn:example:person"/>"#).unwrap();
    let element = order.find("<element").unwrap();
    assert!(annotation < import && import < element);
}
