mod common;

use snowpipe_csv_load::{
    ConfigurationError, Delimiter, Error, LoadSettings, MAX_WARNING_SAMPLES, MemoryStore,
    PreparedLoad, TableStore, load_with,
};

use common::{CountingStore, numbered_csv, with_captured_logs, write_temp};

fn settings_for(file: &std::path::Path, batch_size: usize) -> LoadSettings {
    let mut settings = LoadSettings::new(file, "orders");
    settings.batch_size = batch_size;
    settings
}

fn timestamp_settings(file: &std::path::Path) -> LoadSettings {
    let mut settings = settings_for(file, 5000);
    settings.delimiter = Delimiter::Semicolon;
    settings.timestamp_columns = vec!["col1".into()];
    settings.timestamp_format = "%d/%m/%Y %H:%M:%S".into();
    settings
}

#[test]
fn parseable_timestamp_is_normalized() {
    let file = write_temp("id;col1;name\n1;25/12/2023 10:30:00;Alice\n");
    let mut store = MemoryStore::new();
    let report = PreparedLoad::open(&timestamp_settings(file.path()))
        .unwrap()
        .run(&mut store)
        .unwrap();

    assert_eq!(report.rows_inserted, 1);
    assert_eq!(report.parse_warning_count, 0);
    assert!(report.warning_samples.is_empty());
    let insert = &store.inserts()[0];
    assert_eq!(insert.table, "orders");
    assert_eq!(insert.columns, ["id", "col1", "name"]);
    assert_eq!(
        insert.rows,
        vec![vec![
            Some("1".to_string()),
            Some("2023-12-25T10:30:00Z".to_string()),
            Some("Alice".to_string()),
        ]]
    );
}

#[test]
fn unparseable_timestamp_becomes_null_and_run_continues() {
    let file = write_temp("id;col1;name\n2;not-a-date;Bob\n3;01/01/2024 08:00:00;Carol\n");
    let mut store = MemoryStore::new();
    let settings = timestamp_settings(file.path());

    let (logs, report) =
        with_captured_logs(|| PreparedLoad::open(&settings).unwrap().run(&mut store));
    let report = report.expect("parse failures must not abort the run");

    assert_eq!(report.rows_inserted, 2);
    assert_eq!(report.parse_warning_count, 1);
    assert_eq!(report.warning_samples[0].value, "not-a-date");
    let rows: Vec<_> = store.rows("orders").cloned().collect();
    assert_eq!(
        rows[0],
        vec![Some("2".to_string()), None, Some("Bob".to_string())]
    );
    assert_eq!(rows[1][1].as_deref(), Some("2024-01-01T08:00:00Z"));
    assert!(
        logs.iter()
            .any(|line| line.contains("WARN") && line.contains("not-a-date")),
        "expected a warning naming the bad value, got: {:?}",
        logs
    );
}

#[test]
fn fixture_file_mixes_valid_invalid_and_empty_timestamps() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/orders.csv");
    let mut store = MemoryStore::new();
    let report = PreparedLoad::open(&timestamp_settings(&path))
        .unwrap()
        .run(&mut store)
        .unwrap();

    assert_eq!(report.rows_inserted, 3);
    // the empty field is nulled silently; only the garbage one warns
    assert_eq!(report.parse_warning_count, 1);
    let col1: Vec<_> = store.rows("orders").map(|r| r[1].clone()).collect();
    assert_eq!(
        col1,
        vec![Some("2023-12-25T10:30:00Z".to_string()), None, None]
    );
}

#[test]
fn unknown_timestamp_column_aborts_before_connecting() {
    let file = write_temp("id;col1;name\n1;25/12/2023 10:30:00;Alice\n");
    let mut settings = timestamp_settings(file.path());
    settings.timestamp_columns = vec!["col1".into(), "colX".into()];

    let mut connects = 0;
    let result = load_with(&settings, || {
        connects += 1;
        Ok(CountingStore::default())
    });
    match result {
        Err(Error::Configuration(ConfigurationError::UnknownTimestampColumn(name))) => {
            assert_eq!(name, "colX")
        }
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("expected a configuration error"),
    }
    assert_eq!(connects, 0);
}

#[test]
fn valid_settings_connect_once() {
    let file = write_temp(&numbered_csv(3));
    let mut connects = 0;
    let report = load_with(&settings_for(file.path(), 2), || {
        connects += 1;
        Ok(MemoryStore::new())
    })
    .unwrap();
    assert_eq!(connects, 1);
    assert_eq!(report.rows_inserted, 3);
}

#[test]
fn parse_warnings_are_counted_but_samples_are_bounded() {
    let bad_rows = MAX_WARNING_SAMPLES * 3;
    let mut data = String::from("id;col1;name\n");
    for i in 1..=bad_rows {
        data.push_str(&format!("{i};garbage-{i};n{i}\n"));
    }
    let file = write_temp(&data);
    let mut settings = timestamp_settings(file.path());
    settings.batch_size = 7;

    let mut store = MemoryStore::new();
    let report = PreparedLoad::open(&settings)
        .unwrap()
        .run(&mut store)
        .unwrap();

    assert_eq!(report.rows_inserted, bad_rows);
    assert_eq!(report.parse_warning_count, bad_rows);
    assert_eq!(report.warning_samples.len(), MAX_WARNING_SAMPLES);
    assert_eq!(report.warning_samples[0].value, "garbage-1");
    assert!(store.rows("orders").all(|r| r[1].is_none()));
}

#[test]
fn read_error_logs_rows_left_unsubmitted() {
    let file = write_temp("id,name\n1,a\n2,b\n3,c\n4,d\n5\n");
    let mut store = CountingStore::default();
    let (logs, result) = with_captured_logs(|| {
        PreparedLoad::open(&settings_for(file.path(), 3))
            .unwrap()
            .run(&mut store)
    });

    assert!(matches!(result, Err(Error::RowShape { line: 6, .. })));
    assert_eq!(store.batch_sizes, vec![3]);
    assert!(
        logs.iter().any(|line| line.contains("ERROR")
            && line.contains("after 3 inserted rows")
            && line.contains("1 rows read for the next batch were not submitted")),
        "expected the unsubmitted count to be logged, got: {:?}",
        logs
    );
}

#[test]
fn empty_file_is_a_configuration_error() {
    let file = write_temp("");
    let err = PreparedLoad::open(&settings_for(file.path(), 10)).err();
    assert!(matches!(
        err,
        Some(Error::Configuration(ConfigurationError::MissingHeader))
    ));
}

#[test]
fn submission_count_is_ceiling_of_rows_over_batch_size() {
    for (rows, batch, expected) in [
        (12usize, 5usize, vec![5, 5, 2]),
        (10, 5, vec![5, 5]),
        (1, 5000, vec![1]),
        (3, 1, vec![1, 1, 1]),
        (0, 5, vec![]),
    ] {
        let file = write_temp(&numbered_csv(rows));
        let mut store = CountingStore::default();
        let report = PreparedLoad::open(&settings_for(file.path(), batch))
            .unwrap()
            .run(&mut store)
            .unwrap();
        assert_eq!(store.batch_sizes, expected, "rows={rows} batch={batch}");
        assert_eq!(report.batches, rows.div_ceil(batch));
        assert_eq!(report.rows_inserted, rows);
    }
}

#[test]
fn tuples_follow_header_column_order() {
    let file = write_temp("name,id,note\n\"Smith, J\",7,\"multi\nline\"\nDoe,8,\n");
    let mut store = MemoryStore::new();
    PreparedLoad::open(&settings_for(file.path(), 10))
        .unwrap()
        .run(&mut store)
        .unwrap();

    let insert = &store.inserts()[0];
    assert_eq!(insert.columns, ["name", "id", "note"]);
    assert_eq!(
        insert.rows[0],
        vec![
            Some("Smith, J".to_string()),
            Some("7".to_string()),
            Some("multi\nline".to_string()),
        ]
    );
    // without timestamp columns an empty field is kept as an empty string
    assert_eq!(insert.rows[1][2], Some(String::new()));
}

#[test]
fn failed_batch_stops_the_run() {
    let file = write_temp(&numbered_csv(20));
    let mut store = CountingStore::failing_on(2);
    let (logs, result) = with_captured_logs(|| {
        PreparedLoad::open(&settings_for(file.path(), 5))
            .unwrap()
            .run(&mut store)
    });

    match result {
        Err(Error::Submission(err)) => {
            assert_eq!(err.batch, 2);
            assert_eq!(err.batch_size, 5);
            assert_eq!(err.table, "orders");
            assert_eq!(
                err.first_row,
                Some(vec![Some("6".to_string()), Some("row6".to_string())])
            );
            assert!(matches!(*err.source, Error::Status(..)));
        }
        other => panic!("expected submission error, got {other:?}"),
    }
    // no chunk after the failed one is submitted
    assert_eq!(store.batch_sizes, vec![5, 5]);
    assert!(
        logs.iter()
            .any(|line| line.contains("ERROR") && line.contains("first row in failed batch")),
        "expected the first offending row to be logged, got: {:?}",
        logs
    );
}

// Loading is not idempotent: a plain insert store keeps both copies.
#[test]
fn rerunning_the_same_file_duplicates_rows() {
    let file = write_temp(&numbered_csv(4));
    let settings = settings_for(file.path(), 3);
    let mut store = MemoryStore::new();

    PreparedLoad::open(&settings).unwrap().run(&mut store).unwrap();
    PreparedLoad::open(&settings).unwrap().run(&mut store).unwrap();

    assert_eq!(store.row_count("orders"), 8);
    let ids: Vec<_> = store
        .rows("orders")
        .map(|r| r[0].clone().unwrap())
        .collect();
    assert_eq!(ids, ["1", "2", "3", "4", "1", "2", "3", "4"]);
}

#[test]
fn finish_is_called_once_after_success() {
    struct FinishProbe {
        finished: usize,
    }
    impl TableStore for FinishProbe {
        fn insert(
            &mut self,
            _table: &str,
            _columns: &[String],
            _rows: &[snowpipe_csv_load::Row],
        ) -> Result<(), Error> {
            assert_eq!(self.finished, 0, "insert after finish");
            Ok(())
        }

        fn finish(&mut self) -> Result<(), Error> {
            self.finished += 1;
            Ok(())
        }
    }

    let file = write_temp(&numbered_csv(7));
    let mut store = FinishProbe { finished: 0 };
    PreparedLoad::open(&settings_for(file.path(), 2))
        .unwrap()
        .run(&mut store)
        .unwrap();
    assert_eq!(store.finished, 1);
}
