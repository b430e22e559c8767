use std::io::Write;

use epm_kpi::kpi::{ErrorKind, KpiError};
use epm_kpi::shared::paging::ListQuery;
use epm_kpi::tests::test_util::setup;
use epm_kpi::KpiConfig;

#[test]
fn test_load_from_toml_file_on_disk() {
    setup();
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "default_page_size = 5\nmax_page_size = 50\nmin_fiscal_year = 2020\nmax_fiscal_year = 2030"
    )
    .expect("write config");

    let config = KpiConfig::load_from(file.path()).expect("config loads");
    assert_eq!(config.default_page_size, 5);
    assert!(!config.fiscal_year_in_range(2031));

    let query = ListQuery {
        limit: Some(10_000),
        ..ListQuery::default()
    };
    assert_eq!(query.effective_limit(&config), 50);
    assert_eq!(ListQuery::default().effective_limit(&config), 5);
}

#[test]
fn test_malformed_file_is_a_config_error() {
    setup();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("kpi.toml");
    std::fs::write(&path, "max_page_size = \"lots\"").expect("write config");

    let err = KpiConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, KpiError::Config(_)));
    assert_eq!(err.kind(), ErrorKind::Internal);
}
