use std::sync::Arc;

use async_trait::async_trait;
use reportfinder_catalog::{CatalogError, CatalogSource, ReportCatalog, StaticCatalog};
use reportfinder_core::{MatchMethod, ParameterValues, Report, ReportParameter, ViewerUrlBuilder};
use reportfinder_engine::{
    EngineError, EngineOperation, InMemorySessionStore, OperationOutcome, ReportEngine,
    SessionContext, SessionStore, Stage, StoreError, APOLOGY, BUSY,
};
use reportfinder_llm::{Completion, LlmClient};
use reportfinder_search::{
    BackendError, FieldMapping, RetryPolicy, SearchBackend, SearchClient, SearchHit, SearchRequest,
};

const VIEWER: &str = "https://reports.example.com/ReportServer";

struct FixedHits(Vec<&'static str>);

#[async_trait]
impl SearchBackend for FixedHits {
    async fn search(&self, _request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError> {
        Ok(self
            .0
            .iter()
            .map(|title| SearchHit::from_pairs(&[("id", title), ("title", title), ("content", "docs")]))
            .collect())
    }
}

struct Unreachable;

#[async_trait]
impl CatalogSource for Unreachable {
    async fn list_reports(&self) -> reportfinder_catalog::Result<Vec<Report>> {
        Err(CatalogError::Status {
            status: 503,
            url: "Reports".into(),
        })
    }

    async fn report(&self, _id: &str) -> reportfinder_catalog::Result<Option<Report>> {
        Err(CatalogError::Config("offline".into()))
    }

    async fn parameter_definitions(
        &self,
        _id: &str,
    ) -> reportfinder_catalog::Result<Vec<ReportParameter>> {
        Err(CatalogError::Config("offline".into()))
    }
}

/// Rejects every save as if another turn got there first.
struct AlwaysStale(InMemorySessionStore);

#[async_trait]
impl SessionStore for AlwaysStale {
    async fn get_or_create(&self, session_id: Option<&str>) -> Result<SessionContext, StoreError> {
        self.0.get_or_create(session_id).await
    }

    async fn save(&self, session: SessionContext) -> Result<SessionContext, StoreError> {
        Err(StoreError::Conflict {
            session_id: session.session_id,
            expected: session.version,
            found: session.version + 1,
        })
    }
}

fn reports() -> Vec<Report> {
    vec![
        Report::new("R1", "Sales", "/Finance/Sales").with_parameters(vec![
            ReportParameter::new("Region").allowed(&["North", "South"]),
            ReportParameter::new("Format").optional().defaults(&["PDF"]),
        ]),
        Report::new("R2", "Inventory Status", "Ops/Inventory")
            .with_parameters(vec![ReportParameter::new("Warehouse").optional().defaults(&["All"])]),
        Report::new("R3", "RegionalSalesMonthly", "/Finance/Regional"),
        Report::new("C1", "Customer Churn", "/Sales/Churn")
            .with_parameters(vec![ReportParameter::new("Quarter")]),
    ]
}

fn engine_with(source: Arc<dyn CatalogSource>, hits: Vec<&'static str>) -> ReportEngine {
    let mapping = FieldMapping::new("id", "title", "content").unwrap();
    let search = SearchClient::new(Arc::new(FixedHits(hits)), mapping).with_retry(RetryPolicy::none());
    let llm: Arc<dyn Completion> = Arc::new(LlmClient::local());
    ReportEngine::new(
        ReportCatalog::new(source),
        search,
        llm,
        ViewerUrlBuilder::new(VIEWER).unwrap(),
    )
}

fn engine(hits: Vec<&'static str>) -> ReportEngine {
    engine_with(Arc::new(StaticCatalog::new(reports())), hits)
}

#[tokio::test]
async fn selecting_by_id_then_supplying_region_completes() {
    let engine = engine(vec![]);
    let reply = engine.process_message(Some("s1"), "R1").await;
    assert_eq!(reply.session_id, "s1");
    assert_eq!(reply.stage, Stage::ParameterFilling);
    assert!(reply.message.contains("**Region**"));
    assert!(reply.message.contains("North, South"));

    let reply = engine.process_message(Some("s1"), "Region=North").await;
    assert_eq!(reply.stage, Stage::Completed);
    let url = reply.report_url.expect("url after completion");
    assert!(url.contains("Region=North"));
    assert!(!url.contains("Format="));
    assert_eq!(
        url,
        format!("{VIEWER}?/Finance/Sales&rs:Command=Render&Region=North&rs:Format=HTML5")
    );
}

#[tokio::test]
async fn fresh_session_gets_a_generated_id() {
    let engine = engine(vec![]);
    let reply = engine.process_message(None, "payroll numbers").await;
    assert!(!reply.session_id.is_empty());
    assert_eq!(reply.stage, Stage::ReportSelection);
    assert!(reply.message.contains("more"));
    let session = engine.store().get_or_create(Some(reply.session_id.as_str())).await.unwrap();
    assert_eq!(session.history.len(), 2);
}

#[tokio::test]
async fn single_search_hit_advances_to_parameter_filling() {
    let engine = engine(vec!["Sales"]);
    let reply = engine.process_message(Some("s2"), "show me revenue figures").await;
    assert_eq!(reply.stage, Stage::ParameterFilling);
    assert!(reply.message.contains("**Sales**"));
}

#[tokio::test]
async fn several_hits_produce_a_numbered_list() {
    let engine = engine(vec!["Sales", "Inventory Status", "Sales"]);
    let reply = engine.process_message(Some("s3"), "company overview").await;
    assert_eq!(reply.stage, Stage::ReportSelection);
    assert!(reply.message.contains("1. Sales (/Finance/Sales)"));
    assert!(reply.message.contains("2. Inventory Status"));
    assert!(!reply.message.contains("3."));

    let reply = engine.process_message(Some("s3"), "2").await;
    assert_eq!(reply.stage, Stage::ParameterFilling);
    assert!(reply.message.contains("**Inventory Status**"));

    let reply = engine.process_message(Some("s3"), "go").await;
    assert_eq!(reply.stage, Stage::Completed);
    assert_eq!(
        reply.report_url.as_deref(),
        Some("https://reports.example.com/ReportServer?/Ops/Inventory&rs:Command=Render&rs:Format=HTML5")
    );
}

#[tokio::test]
async fn candidates_can_be_picked_by_name() {
    let engine = engine(vec!["Sales", "Inventory Status"]);
    engine.process_message(Some("s4"), "company overview").await;
    let reply = engine.process_message(Some("s4"), "the inventory one").await;
    assert_eq!(reply.stage, Stage::ParameterFilling);
    assert!(reply.message.contains("Inventory Status"));
}

#[tokio::test]
async fn start_over_clears_the_session() {
    let engine = engine(vec![]);
    engine.process_message(Some("s5"), "Sales").await;
    let done = engine.process_message(Some("s5"), "region: South").await;
    assert_eq!(done.stage, Stage::Completed);

    let echoed = engine.process_message(Some("s5"), "and the link?").await;
    assert_eq!(echoed.stage, Stage::Completed);
    assert!(echoed.message.contains(done.report_url.as_deref().unwrap()));

    let reply = engine.process_message(Some("s5"), "start over").await;
    assert_eq!(reply.stage, Stage::ReportSelection);
    assert!(reply.report_url.is_none());
    let session = engine.store().get_or_create(Some("s5")).await.unwrap();
    assert!(session.selected_report.is_none());
    assert!(session.parameters.is_empty());
    assert!(session.report_url.is_none());
}

#[tokio::test]
async fn changing_parameters_rebuilds_the_url() {
    let engine = engine(vec![]);
    engine.process_message(Some("s6"), "R1").await;
    engine.process_message(Some("s6"), "Region=North").await;

    let reply = engine.process_message(Some("s6"), "change the parameters").await;
    assert_eq!(reply.stage, Stage::ParameterFilling);
    assert!(reply.report_url.is_none());
    assert!(reply.message.contains("Region=North"));

    let reply = engine.process_message(Some("s6"), "Region=South, Format=Excel").await;
    assert_eq!(reply.stage, Stage::Completed);
    let url = reply.report_url.unwrap();
    assert!(url.contains("Region=South"));
    assert!(url.contains("Format=Excel"));
}

#[tokio::test]
async fn disallowed_values_are_reported_not_stored() {
    let engine = engine(vec![]);
    engine.process_message(Some("s7"), "R1").await;
    let reply = engine.process_message(Some("s7"), "Region=West").await;
    assert_eq!(reply.stage, Stage::ParameterFilling);
    assert!(reply.message.contains("not allowed"));
    let session = engine.store().get_or_create(Some("s7")).await.unwrap();
    assert!(session.parameters.is_empty());

    let reply = engine.process_message(Some("s7"), "north").await;
    assert_eq!(reply.stage, Stage::Completed);
    assert!(reply.report_url.unwrap().contains("Region=North"));
}

#[tokio::test]
async fn chit_chat_keeps_the_stage() {
    let engine = engine(vec![]);
    engine.process_message(Some("s8"), "R1").await;
    let reply = engine.process_message(Some("s8"), "Hello!").await;
    assert_eq!(reply.stage, Stage::ParameterFilling);
    assert!(reply.message.starts_with("Hello"));
    let session = engine.store().get_or_create(Some("s8")).await.unwrap();
    assert!(session.parameters.is_empty());
    assert_eq!(session.selected_report.unwrap().id, "R1");
}

#[tokio::test]
async fn non_answers_do_not_fill_the_prompted_parameter() {
    let engine = engine(vec![]);
    let reply = engine.process_message(Some("s12"), "C1").await;
    assert_eq!(reply.stage, Stage::ParameterFilling);
    assert!(reply.message.contains("**Quarter**"));

    for text in ["start over", "I need a different report", "not sure yet"] {
        let reply = engine.process_message(Some("s12"), text).await;
        assert_eq!(reply.stage, Stage::ParameterFilling, "after {text:?}");
        assert!(reply.report_url.is_none());
        assert!(reply.message.contains("Please provide a value for **Quarter**."));
        let session = engine.store().get_or_create(Some("s12")).await.unwrap();
        assert!(session.parameters.is_empty(), "{text:?} was stored");
        assert_eq!(session.selected_report.unwrap().id, "C1");
    }

    let reply = engine.process_message(Some("s12"), "2024-Q1").await;
    assert_eq!(reply.stage, Stage::Completed);
    assert!(reply.report_url.unwrap().contains("Quarter=2024-Q1"));
}

#[tokio::test]
async fn url_creation_with_a_gap_returns_to_parameter_filling() {
    let engine = engine(vec![]);
    let store = engine.store();
    let mut session = store.get_or_create(Some("s13")).await.unwrap();
    let churn = reports().into_iter().find(|report| report.id == "C1").unwrap();
    session.select_report(churn);
    session.stage = Stage::ReportUrlCreation;
    store.save(session).await.unwrap();

    let reply = engine.process_message(Some("s13"), "go").await;
    assert_eq!(reply.stage, Stage::ParameterFilling);
    assert_eq!(reply.message, "Please provide a value for **Quarter**.");
    assert!(reply.report_url.is_none());
    let session = store.get_or_create(Some("s13")).await.unwrap();
    assert_eq!(session.stage, Stage::ParameterFilling);
    assert!(session.parameters.is_empty());
}

#[tokio::test]
async fn catalog_failure_becomes_an_apology() {
    let engine = engine_with(Arc::new(Unreachable), vec!["Sales"]);
    let reply = engine.process_message(Some("s9"), "sales report").await;
    assert_eq!(reply.message, APOLOGY);
    assert_eq!(reply.stage, Stage::ReportSelection);
}

#[tokio::test]
async fn failing_handler_leaves_the_stage_alone() {
    let engine = engine(vec![]);
    let store = engine.store();
    let mut session = store.get_or_create(Some("s10")).await.unwrap();
    session.select_report(Report::new("R9", "Broken", "/"));
    session.stage = Stage::ReportUrlCreation;
    store.save(session).await.unwrap();

    let reply = engine.process_message(Some("s10"), "go").await;
    assert_eq!(reply.message, APOLOGY);
    assert_eq!(reply.stage, Stage::ReportUrlCreation);
    let session = store.get_or_create(Some("s10")).await.unwrap();
    assert_eq!(session.selected_report.unwrap().id, "R9");
}

#[tokio::test]
async fn concurrent_turns_are_rejected_without_changes() {
    let engine = engine(vec![])
        .with_store(Arc::new(AlwaysStale(InMemorySessionStore::new())));
    let reply = engine.process_message(Some("s11"), "R1").await;
    assert_eq!(reply.message, BUSY);
    assert_eq!(reply.stage, Stage::ReportSelection);
}

#[tokio::test]
async fn operations_run_without_a_session() {
    let engine = engine(vec!["Inventory Status"]);

    let mut values = ParameterValues::new();
    values.insert("Region".into(), "North".into());
    values.insert("Format".into(), "PDF".into());
    let outcome = engine
        .execute(EngineOperation::BuildUrl {
            report_id: "R1".into(),
            values,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, OperationOutcome::Url { url } if url.ends_with("&Region=North&rs:Format=HTML5")));

    let outcome = engine
        .execute(EngineOperation::ValidateParameters {
            report_id: "R1".into(),
            values: ParameterValues::new(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, OperationOutcome::Validation { ok: false, errors } if errors.len() == 1));

    let outcome = engine
        .execute(EngineOperation::ExtractParameters {
            report_id: "R1".into(),
            text: "Region: South".into(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, OperationOutcome::Extracted { values } if values["Region"] == "South"));

    let outcome = engine
        .execute(EngineOperation::ResolveReport {
            title: "  regionalsalesmonthly ".into(),
        })
        .await
        .unwrap();
    match outcome {
        OperationOutcome::Resolved { report, method } => {
            assert_eq!(report.unwrap().id, "R3");
            assert_eq!(method, Some(MatchMethod::Exact));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let outcome = engine
        .execute(EngineOperation::SearchReports {
            query: "stock".into(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, OperationOutcome::Reports { hits } if hits.len() == 1));

    let err = engine
        .execute(EngineOperation::BuildUrl {
            report_id: "nope".into(),
            values: ParameterValues::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ReportNotFound(id) if id == "nope"));
}
