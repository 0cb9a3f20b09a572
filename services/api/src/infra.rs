use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tvde_fleet::fleet::Platform;

/// Process-level state for the probes, separate from the domain services.
#[derive(Clone)]
pub(crate) struct ServiceState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    tvde_fleet::ingestion::parse_date(raw)
        .ok_or_else(|| format!("failed to parse '{raw}' as YYYY-MM-DD or DD/MM/YYYY"))
}

pub(crate) fn parse_platform(raw: &str) -> Result<Platform, String> {
    Platform::from_slug(raw).ok_or_else(|| {
        let known: Vec<&str> = Platform::all().iter().map(|p| p.slug()).collect();
        format!("unknown platform '{raw}' (expected one of {})", known.join(", "))
    })
}
