use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

use crate::error::{HarnessError, Result};

/// Parse a backup/archive base URI (`gs://bucket`, `azure://container?..`, `nodelocal:///dir`).
pub fn parse_base(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|e| HarnessError::Config(format!("invalid URI `{uri}`: {e}")))
}

/// Path component for one run: `<scenario>/<RFC3339 nanos>-<iterations>`.
pub fn run_path(scenario: &str, at: DateTime<Utc>, iterations: u64) -> String {
    format!(
        "{scenario}/{}-{iterations}",
        at.to_rfc3339_opts(SecondsFormat::Nanos, true)
    )
}

/// A fresh destination under `base` for one run. Scheme, host and query of
/// the base are kept; its path is replaced.
pub fn run_uri(base: &Url, scenario: &str, at: DateTime<Utc>, iterations: u64) -> Url {
    let mut uri = base.clone();
    uri.set_path(&format!("/{}", run_path(scenario, at, iterations)));
    uri
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(nanos: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 30, 0).unwrap() + chrono::Duration::nanoseconds(nanos.into())
    }

    #[test]
    fn path_has_scenario_timestamp_and_iterations() {
        let path = run_path("BenchmarkBackup2TB", at(5), 1);
        assert_eq!(path, "BenchmarkBackup2TB/2026-10-18T12:30:00.000000005Z-1");
    }

    #[test]
    fn gs_uri_replaces_path() {
        let base = parse_base("gs://cockroach-test").unwrap();
        let uri = run_uri(&base, "BenchmarkBackup2TB", at(0), 1);
        assert_eq!(
            uri.as_str(),
            "gs://cockroach-test/BenchmarkBackup2TB/2026-10-18T12:30:00.000000000Z-1"
        );
    }

    #[test]
    fn azure_query_is_kept() {
        let base = parse_base("azure://backups?AZURE_ACCOUNT_NAME=acct&AZURE_ACCOUNT_KEY=k").unwrap();
        let uri = run_uri(&base, "BenchmarkRestoreBig", at(0), 100);
        assert_eq!(uri.host_str(), Some("backups"));
        assert!(uri.path().starts_with("/BenchmarkRestoreBig/"));
        assert!(uri.path().ends_with("-100"));
        assert_eq!(uri.query(), Some("AZURE_ACCOUNT_NAME=acct&AZURE_ACCOUNT_KEY=k"));
    }

    #[test]
    fn distinct_runs_never_collide() {
        let base = parse_base("gs://bucket").unwrap();
        let a = run_uri(&base, "S", at(1), 10);
        let b = run_uri(&base, "S", at(2), 10);
        let c = run_uri(&base, "S", at(1), 11);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn invalid_base_rejected() {
        assert!(parse_base("not a uri").is_err());
    }
}
