use std::collections::BTreeSet;
use std::sync::Arc;

use techpack_core::clone::{CloneIdentity, CloneSection};
use techpack_core::{HowToMeasure, PackingInfo, Record, RecordId, RecordStatus};
use techpack_engine::EngineError;
use techpack_harness::{
    FakeServer, Op, ResponseShape, TestClient, bom_line, colorway, init_tracing, measurement,
};

fn identity(name: &str, code: &str) -> CloneIdentity {
    CloneIdentity {
        new_product_name: name.to_string(),
        new_article_code: code.to_string(),
    }
}

async fn full_source(client: &mut TestClient) -> Result<Record, EngineError> {
    client.session.open_new();
    client.session.edit(|r| {
        r.article_info.article_code = "SRC-100".into();
        r.article_info.product_name = "Source jacket".into();
        r.article_info.brand = "Acme".into();
        r.bom.push(bom_line("Shell", 1.8));
        r.measurements.push(measurement("CHEST"));
        r.how_to_measures.push(HowToMeasure {
            pom_code: "CHEST".into(),
            description: "Lay flat, measure 1cm below armhole".into(),
            steps: vec!["Lay flat".into(), "Measure across".into()],
            ..Default::default()
        });
        r.colorways.push(colorway("Navy"));
        r.packing = Some(PackingInfo {
            method: "Folded".into(),
            units_per_carton: Some(24),
            ..Default::default()
        });
    });
    client.session.save().await
}

#[tokio::test]
async fn clone_copies_only_selected_sections() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let server = Arc::new(FakeServer::new());
    let mut client = TestClient::new(&server)?;
    let source = full_source(&mut client).await?;

    let sections = BTreeSet::from([CloneSection::Bom]);
    let copy = client
        .session
        .clone_record(&source.id, &identity("  Copy jacket ", "CPY-100"), &sections)
        .await?;

    assert_ne!(copy.id, source.id);
    assert_eq!(copy.version, 1);
    assert_eq!(copy.status, RecordStatus::Draft);
    assert_eq!(copy.article_info.product_name, "Copy jacket");
    assert_eq!(copy.article_info.article_code, "CPY-100");
    assert_eq!(copy.article_info.brand, "");
    assert_eq!(copy.bom, source.bom);
    assert!(copy.measurements.is_empty());
    assert!(copy.how_to_measures.is_empty());
    assert!(copy.colorways.is_empty());
    assert!(copy.packing.is_none());

    assert!(client.session.list_cache().contains(&copy.id));
    assert_eq!(server.record_count().await, 2);

    client.session.open(&copy.id).await?;
    assert_eq!(client.session.record().bom, source.bom);
    assert!(client.session.ledger().is_empty());
    assert!(!client.session.state().has_unsaved_changes);
    Ok(())
}

#[tokio::test]
async fn every_section_can_be_copied() -> Result<(), Box<dyn std::error::Error>> {
    let server = Arc::new(FakeServer::new());
    let mut client = TestClient::new(&server)?;
    let source = full_source(&mut client).await?;

    let sections: BTreeSet<CloneSection> = CloneSection::ALL.into_iter().collect();
    let copy = client
        .session
        .clone_record(&source.id, &identity("Twin jacket", "TWN-100"), &sections)
        .await?;

    assert_eq!(copy.article_info.brand, "Acme");
    assert_eq!(copy.article_info.article_code, "TWN-100");
    assert_eq!(copy.measurements, source.measurements);
    assert_eq!(copy.how_to_measures, source.how_to_measures);
    assert_eq!(copy.colorways, source.colorways);
    assert_eq!(copy.packing, source.packing);
    Ok(())
}

#[tokio::test]
async fn construction_carries_how_to_measure() -> Result<(), Box<dyn std::error::Error>> {
    let server = Arc::new(FakeServer::new());
    let mut client = TestClient::new(&server)?;
    let source = full_source(&mut client).await?;

    let sections = BTreeSet::from([CloneSection::Construction]);
    let copy = client
        .session
        .clone_record(&source.id, &identity("Build jacket", "BLD-100"), &sections)
        .await?;
    assert_eq!(copy.how_to_measures.len(), 1);
    assert_eq!(copy.how_to_measures[0].steps.len(), 2);
    assert!(copy.bom.is_empty());
    Ok(())
}

#[tokio::test]
async fn invalid_identity_is_refused_before_sending() -> Result<(), Box<dyn std::error::Error>> {
    let server = Arc::new(FakeServer::new());
    let mut client = TestClient::new(&server)?;
    let source = full_source(&mut client).await?;

    let sections = BTreeSet::from([CloneSection::Bom]);
    let err = client
        .session
        .clone_record(&source.id, &identity("", "not a code"), &sections)
        .await
        .unwrap_err();
    let fields = err.field_errors();
    assert!(fields.contains_key("newArticleCode"));
    assert!(fields.contains_key("newProductName"));

    let err = client
        .session
        .clone_record(&RecordId::unsaved(), &identity("Ghost", "GHOST-1"), &sections)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RecordNotSaved));
    assert_eq!(server.calls(Op::Clone).await, 0);
    Ok(())
}

#[tokio::test]
async fn duplicate_code_reports_server_field_error() -> Result<(), Box<dyn std::error::Error>> {
    let server = Arc::new(FakeServer::with_shape(ResponseShape::Wrapped));
    let mut client = TestClient::new(&server)?;
    let source = full_source(&mut client).await?;

    let sections = BTreeSet::from([CloneSection::ArticleInfo]);
    let err = client
        .session
        .clone_record(&source.id, &identity("Same code", "SRC-100"), &sections)
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert_eq!(
        err.field_errors().get("newArticleCode").map(String::as_str),
        Some("already exists")
    );
    assert_eq!(server.record_count().await, 1);
    Ok(())
}
