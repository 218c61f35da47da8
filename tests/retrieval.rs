//! Integration tests for the retrieval cascade.
//! Tests: stage ordering, access filtering, fallbacks, pattern boost, placeholder

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{RuleEmbedder, SwitchableEmbedder, memory_source, sample_documents};
use docia_core::{
    CancelToken, Docia, DociaError, DocumentId, DocumentSource, EngineConfig, HashEmbedder,
    MutationOptions, Requester, RetrievalStage, SourceDocument,
};

fn unit(axis: usize) -> Vec<f32> {
    let mut vector = vec![0.0; 4];
    vector[axis] = 1.0;
    vector
}

fn rule_embedder() -> Arc<RuleEmbedder> {
    Arc::new(
        RuleEmbedder::new(unit(3))
            .rule("licencias", unit(0))
            .rule("numero", unit(1))
            .rule("xyz", unit(2)),
    )
}

fn build(documents: Vec<SourceDocument>) -> Docia {
    let docia = Docia::in_memory(rule_embedder()).unwrap();
    docia
        .rebuild_from(&documents, &MutationOptions::default())
        .unwrap();
    docia
}

fn leak_documents() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new(DocumentId(1), "Resolución sobre rutas nacionales.")
            .with_department("legal")
            .reviewed(true),
        SourceDocument::new(DocumentId(2), "Licencias del personal administrativo.")
            .with_department("rrhh")
            .reviewed(false),
    ]
}

#[test]
fn semantic_stage_respects_access_rules() {
    let docia = build(leak_documents());

    let response = docia
        .retrieve(&docia.request("licencias personal", Requester::general()))
        .unwrap();
    let top = &response.candidates[0];
    assert_eq!(top.document_id, Some(DocumentId(2)));
    assert_eq!(top.origin, Some(RetrievalStage::Semantic));
    assert!((top.score - 1.0).abs() < 1e-5);
    assert_eq!(response.acl.allowed, 1);
}

#[test]
fn low_confidence_stage_returns_fragments_the_semantic_stage_denied() {
    let docia = build(leak_documents());
    let request = docia.request("licencias personal", Requester::department("legal"));
    let response = docia.retrieve(&request).unwrap();

    assert_eq!(response.acl.denied_unreviewed, 1);
    assert_eq!(response.acl.allowed, 0);
    let semantic = response.stage(RetrievalStage::Semantic).unwrap();
    assert!(semantic.ran);
    assert_eq!(semantic.produced, 0);

    // Unreviewed fragment of another department reaches the requester.
    assert_eq!(response.candidates.len(), 1);
    let leaked = &response.candidates[0];
    assert_eq!(leaked.document_id, Some(DocumentId(2)));
    assert_eq!(leaked.origin, Some(RetrievalStage::LowConfidence));
    assert_eq!(leaked.department_code.as_deref(), Some("rrhh"));
}

#[test]
fn unmatched_query_returns_single_placeholder() {
    let docia = build(leak_documents());
    let response = docia
        .retrieve(&docia.request("xyz qqq", Requester::anonymous()))
        .unwrap();
    assert_eq!(response.candidates.len(), 1);
    let placeholder = &response.candidates[0];
    assert!(placeholder.is_placeholder());
    assert_eq!(placeholder.text, "no information found");
    assert_eq!(placeholder.score, 0.0);
    assert!(!placeholder.literal_match);
    assert!(response.is_empty());
}

#[test]
fn identity_number_is_found_through_pattern_boost() {
    let docia = build(vec![
        SourceDocument::new(DocumentId(1), "Número de trámite uno.").reviewed(true),
        SourceDocument::new(DocumentId(2), "Número de trámite dos.").reviewed(true),
        SourceDocument::new(DocumentId(3), "Número de trámite tres.").reviewed(true),
        SourceDocument::new(
            DocumentId(4),
            "Expediente del ciudadano con cédula 3.456.789-2 archivado.",
        )
        .reviewed(true),
    ]);

    let response = docia
        .retrieve(&docia.request("número 3.456.789-2", Requester::general()))
        .unwrap();

    assert_eq!(response.stage(RetrievalStage::Semantic).unwrap().produced, 3);
    assert!(!response.stage(RetrievalStage::LowConfidence).unwrap().ran);
    assert_eq!(response.stage(RetrievalStage::ExactPhrase).unwrap().produced, 0);
    assert!(!response.stage(RetrievalStage::Keyword).unwrap().ran);

    let top = &response.candidates[0];
    assert_eq!(top.document_id, Some(DocumentId(4)));
    assert_eq!(top.origin, Some(RetrievalStage::PatternBoost));
    assert_eq!(top.score, 3.0);
    assert_eq!(response.candidates.len(), 4);
}

#[test]
fn exact_phrase_and_keyword_stages_fill_in_after_semantic_miss() {
    let docia = Docia::in_memory(Arc::new(HashEmbedder::new(64))).unwrap();
    docia
        .rebuild_from(&sample_documents(), &MutationOptions::default())
        .unwrap();

    let request = docia
        .request("ruta 5", Requester::general())
        .with_thresholds(1.01, 1.01);
    let response = docia.retrieve(&request).unwrap();

    // Phrase match plus the address pattern "ruta 5".
    let top = &response.candidates[0];
    assert_eq!(top.document_id, Some(DocumentId(1)));
    assert_eq!(top.origin, Some(RetrievalStage::ExactPhrase));
    assert_eq!(top.score, 8.0);
    assert!(top.literal_match);
    assert_eq!(response.stage(RetrievalStage::PatternBoost).unwrap().boosted, 1);

    // The lone word "5" also occurs inside the identity number of document 3.
    let keyword = response.stage(RetrievalStage::Keyword).unwrap();
    assert!(keyword.ran);
    assert_eq!(keyword.produced, 1);
    let second = &response.candidates[1];
    assert_eq!(second.document_id, Some(DocumentId(3)));
    assert_eq!(second.score, 2.0);
    assert!(!second.literal_match);
    assert_eq!(response.candidates.len(), 2);
}

#[test]
fn results_never_repeat_document_and_text() {
    let docia = build(vec![
        SourceDocument::new(
            DocumentId(1),
            "Artículo 1 Licencias iguales. Artículo 1 Licencias iguales.",
        )
        .with_kind("ley")
        .reviewed(true),
    ]);
    assert_eq!(docia.len().unwrap(), 2);

    let response = docia
        .retrieve(&docia.request("licencias iguales", Requester::general()))
        .unwrap();
    let mut seen = HashSet::new();
    for candidate in &response.candidates {
        assert!(seen.insert((candidate.document_id, candidate.text.clone())));
    }
    assert_eq!(response.candidates.len(), 1);
}

#[test]
fn fragments_of_vanished_documents_are_skipped() {
    let source = memory_source(leak_documents());
    let docia = Docia::in_memory(rule_embedder())
        .unwrap()
        .with_document_source(source.clone());
    docia.rebuild(&MutationOptions::default()).unwrap();

    source.delete(DocumentId(2)).unwrap();
    assert!(!source.exists(DocumentId(2)).unwrap());

    let response = docia
        .retrieve(&docia.request("licencias personal", Requester::general()))
        .unwrap();
    assert!(
        response
            .candidates
            .iter()
            .all(|candidate| candidate.document_id != Some(DocumentId(2)))
    );
}

#[test]
fn results_are_sorted_and_flag_literal_matches() {
    let docia = Docia::in_memory(Arc::new(HashEmbedder::new(64))).unwrap();
    docia
        .rebuild_from(&sample_documents(), &MutationOptions::default())
        .unwrap();
    let response = docia
        .retrieve(&docia.request("licencia anual", Requester::general()))
        .unwrap();

    assert!(
        response
            .candidates
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score)
    );
    let literal: Vec<_> = response
        .candidates
        .iter()
        .filter(|candidate| candidate.literal_match)
        .collect();
    assert!(!literal.is_empty());
    assert!(literal.iter().all(|candidate| {
        candidate.document_id == Some(DocumentId(2))
            && docia_core::has_literal_match("licencia anual", &candidate.text)
    }));
}

#[test]
fn blank_queries_are_rejected() {
    let docia = build(leak_documents());
    for query in ["", "   ", "\t\n"] {
        let err = docia
            .retrieve(&docia.request(query, Requester::general()))
            .unwrap_err();
        assert!(matches!(err, DociaError::InvalidQuery { .. }));
    }
    let err = docia
        .retrieve(&docia.request("licencias", Requester::general()).with_top_k(0))
        .unwrap_err();
    assert!(matches!(err, DociaError::InvalidQuery { .. }));
}

#[test]
fn context_helpers_follow_literal_matches() {
    let docia = Docia::in_memory(Arc::new(HashEmbedder::new(64))).unwrap();
    docia
        .rebuild_from(&sample_documents(), &MutationOptions::default())
        .unwrap();
    let response = docia
        .retrieve(&docia.request("licencia anual", Requester::general()))
        .unwrap();

    let context = response.context_candidates(0);
    assert!(!context.is_empty());
    assert!(context.iter().all(|candidate| candidate.literal_match));

    let limited = response.limit_per_document(1);
    let documents: HashSet<_> = limited.iter().map(|c| c.document_id).collect();
    assert_eq!(documents.len(), limited.len());
}

fn switchable_handle(config: EngineConfig) -> (Docia, Arc<SwitchableEmbedder>) {
    let embedder = Arc::new(SwitchableEmbedder::new(32));
    let docia = Docia::open(config, embedder.clone()).unwrap();
    docia
        .rebuild_from(&sample_documents(), &MutationOptions::default())
        .unwrap();
    (docia, embedder)
}

#[test]
fn slow_query_embedding_hits_the_configured_deadline() {
    let config = EngineConfig::builder()
        .embed_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let (docia, embedder) = switchable_handle(config);

    embedder.set_slow();
    let started = Instant::now();
    let err = docia
        .retrieve(&docia.request("licencia anual", Requester::general()))
        .unwrap_err();
    assert!(matches!(err, DociaError::EmbeddingTimeout { .. }));
    assert!(started.elapsed() < Duration::from_millis(390));

    embedder.set_healthy();
    let response = docia
        .retrieve(&docia.request("licencia anual", Requester::general()))
        .unwrap();
    assert!(!response.is_empty());
}

#[test]
fn request_timeout_overrides_missing_configured_deadline() {
    let (docia, embedder) = switchable_handle(EngineConfig::default());
    embedder.set_slow();
    let request = docia
        .request("licencia anual", Requester::general())
        .with_timeout(Duration::from_millis(50));
    let err = docia.retrieve(&request).unwrap_err();
    assert!(matches!(err, DociaError::EmbeddingTimeout { .. }));

    let zero = docia
        .request("licencia anual", Requester::general())
        .with_timeout(Duration::ZERO);
    assert!(matches!(
        docia.retrieve(&zero),
        Err(DociaError::InvalidQuery { .. })
    ));
}

#[test]
fn cancelled_request_is_abandoned_before_embedding() {
    let (docia, _embedder) = switchable_handle(EngineConfig::default());
    let token = CancelToken::new();
    token.cancel();
    let request = docia
        .request("licencia anual", Requester::general())
        .with_cancel(token);
    assert!(matches!(
        docia.retrieve(&request),
        Err(DociaError::Cancelled)
    ));
}
