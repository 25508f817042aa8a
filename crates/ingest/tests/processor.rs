mod support;

use billing_core::{Compression, ReportType};
use billing_db::ReportTable;
use ingest::{IngestError, ProcessorOptions, ReportProcessor, update_aws_rollups, update_ocp_rollups};
use support::{
    CUR_HEADER, OCP_STORAGE_HEADER, OCP_USAGE_HEADER, PROVIDER_ID, SCHEMA, count, csv_body,
    cur_line, date, gzip, open_tenant, storage_line, usage_line, write_file,
};

fn options(path: &std::path::Path, compression: Compression) -> ProcessorOptions {
    ProcessorOptions::new(SCHEMA, path, compression, PROVIDER_ID)
}

#[test]
fn processing_the_same_file_twice_writes_nothing_new() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut db = open_tenant(dir.path());
    let body = csv_body(
        CUR_HEADER,
        &[
            cur_line("a1", 3, 10, "i-1", 1.0, 0.5),
            cur_line("a2", 3, 11, "i-1", 2.0, 0.5),
            cur_line("a3", 3, 11, "i-2", 1.0, 0.25),
        ],
    );
    let path = write_file(&dir.path().join("cur.csv.gz"), &gzip(&body));

    let mut processor =
        ReportProcessor::new(&mut db, options(&path, Compression::Gzip)).expect("processor");
    assert_eq!(processor.report_type(), ReportType::AwsCostUsage);
    let first = processor.process().expect("first run");
    assert_eq!(processor.buffered_rows(), 0);
    assert_eq!(first.records_read, 3);
    assert_eq!(first.aws_line_items, 3);
    assert_eq!(first.bills, 1);
    assert_eq!(first.cost_entries, 2);
    assert_eq!(first.products, 1);
    assert_eq!(first.pricing, 1);

    let mut options = options(&path, Compression::Gzip);
    options.batch_size = 1;
    let second = ReportProcessor::new(&mut db, options)
        .expect("processor")
        .process()
        .expect("second run");
    assert_eq!(second.records_read, 3);
    assert_eq!(second.line_items(), 0);
    assert_eq!(second.bills, 0);
    assert_eq!(count(&db, ReportTable::AwsLineItem), 3);
    assert_eq!(count(&db, ReportTable::AwsBill), 1);
    assert_eq!(count(&db, ReportTable::AwsProduct), 1);
}

#[test]
fn duplicate_rows_collapse_and_distinct_rows_double() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut db = open_tenant(dir.path());
    let original = vec![
        cur_line("a1", 3, 10, "i-1", 1.0, 0.5),
        cur_line("a2", 3, 11, "i-1", 1.0, 0.5),
    ];

    let mut doubled = original.clone();
    doubled.extend(original.iter().cloned());
    let path = write_file(&dir.path().join("dupes.csv"), &csv_body(CUR_HEADER, &doubled));
    let counts = ReportProcessor::new(&mut db, options(&path, Compression::None))
        .expect("processor")
        .process()
        .expect("process");
    assert_eq!(counts.aws_line_items, 2);
    assert_eq!(counts.duplicates_skipped, 2);
    assert_eq!(count(&db, ReportTable::AwsLineItem), 2);

    // Same ids in a different case hash to the same key.
    let upper = vec![
        cur_line("A1", 3, 10, "i-1", 1.0, 0.5),
        cur_line("b1", 3, 12, "i-1", 1.0, 0.5),
        cur_line("b2", 3, 13, "i-1", 1.0, 0.5),
    ];
    let path = write_file(&dir.path().join("more.csv"), &csv_body(CUR_HEADER, &upper));
    let counts = ReportProcessor::new(&mut db, options(&path, Compression::None))
        .expect("processor")
        .process()
        .expect("process");
    assert_eq!(counts.aws_line_items, 2);
    assert_eq!(count(&db, ReportTable::AwsLineItem), 4);
}

#[test]
fn unsupported_compression_fails_before_reading() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut db = open_tenant(dir.path());
    let missing = dir.path().join("does-not-exist.csv");
    let mut options = options(&missing, Compression::None);
    options.compression = "unsupported".to_string();
    match ReportProcessor::new(&mut db, options) {
        Err(IngestError::UnsupportedCompression(value)) => assert_eq!(value, "unsupported"),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("processor should not open"),
    }
}

#[test]
fn schema_must_match_the_tenant() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut db = open_tenant(dir.path());
    let path = write_file(
        &dir.path().join("cur.csv"),
        &csv_body(CUR_HEADER, &[cur_line("a1", 3, 10, "i-1", 1.0, 0.5)]),
    );
    let options = ProcessorOptions::new("acct99999", &path, Compression::None, PROVIDER_ID);
    assert!(matches!(
        ReportProcessor::new(&mut db, options),
        Err(IngestError::TenantMismatch { .. })
    ));
}

#[test]
fn unknown_headers_are_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut db = open_tenant(dir.path());
    let path = write_file(&dir.path().join("other.csv"), b"foo,bar\n1,2\n");
    assert!(matches!(
        ReportProcessor::new(&mut db, options(&path, Compression::None)),
        Err(IngestError::UnrecognizedReportType { .. })
    ));
}

#[test]
fn parse_errors_leave_no_partial_batch() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut db = open_tenant(dir.path());
    let mut bad = cur_line("a2", 3, 11, "i-1", 1.0, 0.5);
    bad = bad.replacen(",i-1,1,", ",i-1,lots,", 1);
    let path = write_file(
        &dir.path().join("bad.csv"),
        &csv_body(CUR_HEADER, &[cur_line("a1", 3, 10, "i-1", 1.0, 0.5), bad]),
    );
    let mut options = options(&path, Compression::None);
    options.batch_size = 10;
    let mut processor = ReportProcessor::new(&mut db, options).expect("processor");
    match processor.process() {
        Err(IngestError::Parse { column, line, .. }) => {
            assert_eq!(column, "lineItem/UsageAmount");
            assert_eq!(line, 3);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
    assert_eq!(processor.buffered_rows(), 0);
    drop(processor);
    assert_eq!(count(&db, ReportTable::AwsLineItem), 0);
}

#[test]
fn cur_rollups_sum_usage_and_count_resources() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut db = open_tenant(dir.path());
    let path = write_file(
        &dir.path().join("cur.csv"),
        &csv_body(
            CUR_HEADER,
            &[
                cur_line("a1", 3, 10, "i-1", 1.0, 0.5),
                cur_line("a2", 3, 11, "i-1", 2.0, 0.75),
                cur_line("a3", 3, 11, "i-2", 4.0, 0.25),
                cur_line("a4", 4, 1, "i-1", 1.0, 0.5),
            ],
        ),
    );
    ReportProcessor::new(&mut db, options(&path, Compression::None))
        .expect("processor")
        .process()
        .expect("process");

    let counts =
        update_aws_rollups(&mut db, PROVIDER_ID, date(2018, 9, 1), date(2018, 9, 30)).expect("rollup");
    assert_eq!(counts.daily_rows, 3);
    assert_eq!(counts.summary_rows, 2);

    let daily = db
        .aws_daily_rows(PROVIDER_ID, date(2018, 9, 3), date(2018, 9, 3))
        .expect("daily");
    let first = daily.iter().find(|row| row.resource_id == "i-1").expect("i-1");
    assert!((first.usage_amount - 3.0).abs() < 1e-9);
    assert!((first.unblended_rate - 0.75).abs() < 1e-9);
    assert_eq!(first.tags.get("environment").map(String::as_str), Some("prod"));
    assert_eq!(first.region, "us-east-1");

    let summary = db
        .aws_summary_rows(PROVIDER_ID, date(2018, 9, 3), date(2018, 9, 3))
        .expect("summary");
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].resource_count, 2);
    assert!((summary[0].usage_amount - 7.0).abs() < 1e-9);
    assert!((summary[0].unblended_cost - 3.0).abs() < 1e-9);

    // Reruns reproduce the same rows.
    let again =
        update_aws_rollups(&mut db, PROVIDER_ID, date(2018, 9, 1), date(2018, 9, 30)).expect("rollup");
    assert_eq!(again, counts);
    assert_eq!(count(&db, ReportTable::AwsDailySummary), 2);
}

#[test]
fn cluster_usage_and_storage_roll_up_with_unit_conversion() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut db = open_tenant(dir.path());
    let usage = write_file(
        &dir.path().join("usage.csv"),
        &csv_body(
            OCP_USAGE_HEADER,
            &[
                usage_line("pod-a", "node-1", 3, 10, 3600.0),
                usage_line("pod-a", "node-1", 3, 11, 3600.0),
                usage_line("pod-b", "node-2", 3, 10, 1800.0),
            ],
        ),
    );
    let mut usage_options = options(&usage, Compression::None);
    usage_options.cluster_id = Some("my-ocp-cluster-1".to_string());
    let counts = ReportProcessor::new(&mut db, usage_options)
        .expect("processor")
        .process()
        .expect("usage");
    assert_eq!(counts.ocp_usage_line_items, 3);
    assert_eq!(counts.report_periods, 1);
    assert_eq!(counts.reports, 2);

    let storage = write_file(
        &dir.path().join("storage.csv"),
        &csv_body(
            OCP_STORAGE_HEADER,
            &[
                storage_line("data-db-0", "pv-1", 3, 10),
                storage_line("data-db-0", "pv-1", 3, 11),
            ],
        ),
    );
    let mut storage_options = options(&storage, Compression::None);
    storage_options.cluster_id = Some("my-ocp-cluster-1".to_string());
    let mut processor = ReportProcessor::new(&mut db, storage_options).expect("processor");
    assert_eq!(processor.report_type(), ReportType::OcpStorage);
    let counts = processor.process().expect("storage");
    assert_eq!(counts.ocp_storage_line_items, 2);
    assert_eq!(counts.report_periods, 0);
    assert_eq!(counts.reports, 0);

    update_ocp_rollups(&mut db, PROVIDER_ID, date(2018, 9, 1), date(2018, 9, 30)).expect("rollup");

    let summary = db
        .ocp_usage_summary_rows(PROVIDER_ID, date(2018, 9, 3), date(2018, 9, 3))
        .expect("usage summary");
    let pod_a = summary.iter().find(|row| row.pod == "pod-a").expect("pod-a");
    assert_eq!(pod_a.cluster_id, "my-ocp-cluster-1");
    assert!((pod_a.pod_usage_cpu_core_hours - 2.0).abs() < 1e-9);
    assert!((pod_a.pod_usage_memory_gigabyte_hours - 2.0).abs() < 1e-9);
    assert!((pod_a.node_capacity_memory_gigabytes - 2.0).abs() < 1e-9);
    assert_eq!(pod_a.resource_count, 1);
    assert_eq!(pod_a.pod_labels.get("app").map(String::as_str), Some("web"));
    // node-1 at 10:00 and 11:00 plus node-2 at 10:00, 7200 core-seconds each.
    assert!((pod_a.cluster_capacity_cpu_core_hours - 6.0).abs() < 1e-9);
    // A single cluster: the daily total equals its cluster capacity.
    assert!((pod_a.total_capacity_cpu_core_hours - 6.0).abs() < 1e-9);
    assert!(
        (pod_a.total_capacity_memory_gigabyte_hours - pod_a.cluster_capacity_memory_gigabyte_hours)
            .abs()
            < 1e-9
    );

    let storage = db
        .ocp_storage_summary_rows(PROVIDER_ID, date(2018, 9, 3), date(2018, 9, 3))
        .expect("storage summary");
    assert_eq!(storage.len(), 1);
    let row = &storage[0];
    assert_eq!(row.resource_count, 1);
    assert!((row.persistentvolumeclaim_capacity_gigabyte - 2.0).abs() < 1e-9);
    // 2 hours at 2 GiB in a 30-day month.
    let expected = 2.0 * 3600.0 * 2.0 / 86400.0 * 30.0;
    assert!((row.persistentvolumeclaim_capacity_gigabyte_months - expected).abs() < 1e-9);
    assert_eq!(row.volume_labels.get("app").map(String::as_str), Some("cache"));
    assert_eq!(row.volume_labels.get("tier").map(String::as_str), Some("gold"));
}
