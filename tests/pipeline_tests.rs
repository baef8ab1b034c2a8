//! End-to-end pipeline tests against the in-memory backend

use std::io::Write;

use chrono::{Days, NaiveDate};
use customer_etl::database::{MemoryBackend, TableLayout, WarehouseBackend};
use customer_etl::pipeline::{EtlPipeline, PipelineError, PipelineSettings};
use customer_etl::staging::StagingError;
use customer_etl::{ExtractError, PartitionKey};
use tempfile::NamedTempFile;

const HEADER: &str = "H|Customer_Name|Customer_Id|Open_Date|Last_Consulted_Date|Vaccination_Id|Dr_Name|State|Country|DOB|Is_Active";

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

fn days_ago(days: u64) -> String {
    (as_of() - Days::new(days)).format("%Y%m%d").to_string()
}

fn data_line(name: &str, id: &str, last_consulted: &str, country: &str) -> String {
    format!("D|{name}|{id}|20101012|{last_consulted}|MVD|Paul|SA|{country}|06031987|A")
}

fn batch_file(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        as_of: Some(as_of()),
        ..PipelineSettings::default()
    }
}

async fn backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.initialize(&TableLayout::default()).await.unwrap();
    backend
}

#[tokio::test]
async fn test_end_to_end_single_row() {
    let backend = backend().await;
    let file = batch_file(&[data_line("Alex", "123457", &days_ago(35), " USA ")]);

    let pipeline = EtlPipeline::new(&backend, settings());
    let report = pipeline.run(file.path()).await.unwrap();

    assert_eq!(report.records_extracted, 1);
    assert_eq!(report.load.rows_loaded, 1);
    assert_eq!(report.merge.rows_upserted, 1);
    assert_eq!(report.source_sha256.len(), 64);

    let curated = backend.curated_rows("curate", "customer_info").await.unwrap();
    assert_eq!(curated.len(), 1);
    let row = &curated[0];
    assert_eq!(row.customer.country.as_str(), "USA");
    assert_eq!(row.customer.customer_id, "123457");
    assert_eq!(row.age, 37);
    assert_eq!(row.days_since_last_consulted, 35);
    assert_eq!(row.post_code, None);

    for schema in ["stg", "curate"] {
        let partitions = backend.partitions(schema, "customer_info").await.unwrap();
        assert_eq!(
            partitions,
            vec![(
                "customer_info_usa".to_string(),
                PartitionKey::parse("USA").unwrap()
            )]
        );
    }
}

#[tokio::test]
async fn test_country_spellings_share_a_partition() {
    let backend = backend().await;
    let file = batch_file(&[
        data_line("Alex", "1", &days_ago(40), " India "),
        data_line("John", "2", &days_ago(40), "india"),
        data_line("Mary", "3", &days_ago(40), "INDIA"),
    ]);

    let pipeline = EtlPipeline::new(&backend, settings());
    let report = pipeline.run(file.path()).await.unwrap();

    // One key, ensured once per schema
    assert_eq!(report.load.partitions.len(), 2);
    let partitions = backend.partitions("stg", "customer_info").await.unwrap();
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].0, "customer_info_india");
    assert_eq!(
        backend.curated_rows("curate", "customer_info").await.unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_staging_holds_only_latest_batch() {
    let backend = backend().await;
    let pipeline = EtlPipeline::new(&backend, settings());

    let first = batch_file(&[
        data_line("Alex", "1", &days_ago(40), "USA"),
        data_line("John", "2", &days_ago(40), "IND"),
    ]);
    let second = batch_file(&[data_line("Mary", "3", &days_ago(40), "AU")]);

    pipeline.run(first.path()).await.unwrap();
    pipeline.run(second.path()).await.unwrap();

    let staged = backend.staging_rows("stg", "customer_info").await.unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].customer_id, "3");

    // Curated keeps everything merged so far
    assert_eq!(
        backend.curated_rows("curate", "customer_info").await.unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_only_rows_past_threshold_merge() {
    let backend = backend().await;
    let file = batch_file(&[
        data_line("Alex", "1", &days_ago(10), "USA"),
        data_line("Alex", "1", &days_ago(40), "USA"),
        data_line("John", "2", &days_ago(5), "USA"),
    ]);

    let pipeline = EtlPipeline::new(&backend, settings());
    let report = pipeline.run(file.path()).await.unwrap();
    assert_eq!(report.merge.rows_upserted, 1);

    let curated = backend.curated_rows("curate", "customer_info").await.unwrap();
    assert_eq!(curated.len(), 1);
    assert_eq!(curated[0].customer.customer_id, "1");
    assert_eq!(curated[0].days_since_last_consulted, 40);
}

#[tokio::test]
async fn test_most_recent_eligible_row_wins() {
    let backend = backend().await;
    let file = batch_file(&[
        data_line("Alex", "1", &days_ago(90), "USA"),
        data_line("Alex", "1", &days_ago(45), "USA"),
        data_line("Alex", "1", &days_ago(60), "USA"),
    ]);

    let pipeline = EtlPipeline::new(&backend, settings());
    pipeline.run(file.path()).await.unwrap();

    let curated = backend.curated_rows("curate", "customer_info").await.unwrap();
    assert_eq!(curated.len(), 1);
    assert_eq!(
        curated[0].customer.last_consulted_date,
        as_of() - Days::new(45)
    );
}

#[tokio::test]
async fn test_rerun_leaves_curated_unchanged() {
    let backend = backend().await;
    let file = batch_file(&[
        data_line("Alex", "1", &days_ago(40), "USA"),
        data_line("John", "2", &days_ago(50), "IND"),
    ]);

    let pipeline = EtlPipeline::new(&backend, settings());
    pipeline.run(file.path()).await.unwrap();
    let before = backend.curated_rows("curate", "customer_info").await.unwrap();

    pipeline.incremental_merge().await.unwrap();
    pipeline.run(file.path()).await.unwrap();
    let after = backend.curated_rows("curate", "customer_info").await.unwrap();

    assert_eq!(before, after);
}

#[tokio::test]
async fn test_stale_batch_does_not_regress_curated() {
    let backend = backend().await;
    let pipeline = EtlPipeline::new(&backend, settings());

    let recent = batch_file(&[data_line("Alex", "1", &days_ago(40), "USA")]);
    let stale = batch_file(&[data_line("Alex", "1", &days_ago(200), "USA")]);

    pipeline.run(recent.path()).await.unwrap();
    let report = pipeline.run(stale.path()).await.unwrap();
    assert_eq!(report.merge.rows_upserted, 0);

    let curated = backend.curated_rows("curate", "customer_info").await.unwrap();
    assert_eq!(curated[0].days_since_last_consulted, 40);
}

#[tokio::test]
async fn test_missing_header_touches_nothing() {
    let backend = backend().await;
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", data_line("Alex", "1", &days_ago(40), "USA")).unwrap();
    file.flush().unwrap();

    let pipeline = EtlPipeline::new(&backend, settings());
    let err = pipeline.run(file.path()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Extract(ExtractError::MissingHeader)
    ));
    assert!(backend.partitions("stg", "customer_info").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_undecodable_file_touches_nothing() {
    let backend = backend().await;
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    file.write_all(b"D|Alex|1|20101012|20240401|MVD|Paul|SA|US\xFFA|06031987|A\n")
        .unwrap();
    file.flush().unwrap();

    let pipeline = EtlPipeline::new(&backend, settings());
    let err = pipeline.run(file.path()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Extract(ExtractError::InvalidUtf8 { line: 2, .. })
    ));
    assert!(backend.partitions("stg", "customer_info").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_date_is_rejected_before_loading() {
    let backend = backend().await;
    let file = batch_file(&[data_line("Alex", "1", "31/31/2024", "USA")]);

    let pipeline = EtlPipeline::new(&backend, settings());
    let err = pipeline.run(file.path()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Batch(_)));
    assert!(backend.partitions("stg", "customer_info").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_strict_partition_failure_aborts_load() {
    let backend = backend().await;
    let file = batch_file(&[data_line("Alex", "1", &days_ago(40), "USA")]);

    let settings = PipelineSettings {
        curated_schema: "archive".to_string(),
        ..settings()
    };
    let pipeline = EtlPipeline::new(&backend, settings);
    let err = pipeline.run(file.path()).await.unwrap_err();

    match err {
        PipelineError::Staging(StagingError::Partition { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("archive"));
        }
        other => panic!("expected partition failure, got {:?}", other),
    }
    assert!(backend.staging_rows("stg", "customer_info").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lenient_partition_failure_still_loads() {
    let backend = backend().await;
    let file = batch_file(&[data_line("Alex", "1", &days_ago(40), "USA")]);

    let settings = PipelineSettings {
        curated_schema: "archive".to_string(),
        strict_partitions: false,
        ..settings()
    };
    let pipeline = EtlPipeline::new(&backend, settings);

    let (batch, _) = pipeline.extract(file.path()).unwrap();
    let report = pipeline.load_staging(&batch).await.unwrap();
    assert_eq!(report.rows_loaded, 1);
    assert_eq!(report.failed_partitions().count(), 1);
    assert_eq!(
        backend.staging_rows("stg", "customer_info").await.unwrap().len(),
        1
    );

    // Curated parent does not exist in this schema
    assert!(matches!(
        pipeline.incremental_merge().await,
        Err(PipelineError::Merge(_))
    ));
}
