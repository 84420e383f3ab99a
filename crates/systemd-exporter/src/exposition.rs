//! Rendering a cycle's samples for Prometheus and for `--once` dumps.

use chrono::{DateTime, SecondsFormat, Utc};
use prometheus::{CounterVec, GaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use systemd_exporter_core::collector::{METRICS, MetricKind, Sample};

/// Content type of the Prometheus text exposition format.
pub(crate) const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

/// Renders samples in the Prometheus text format.
///
/// A fresh registry is built per call, so metrics of units that went away
/// never linger between scrapes.
pub(crate) fn render_text(samples: &[Sample]) -> Result<String, prometheus::Error> {
    let registry = Registry::new();

    let mut families = Vec::with_capacity(METRICS.len());
    for desc in METRICS {
        let opts = Opts::new(desc.name, desc.help);
        let family = match desc.kind {
            MetricKind::Gauge => {
                let vec = GaugeVec::new(opts, desc.labels)?;
                registry.register(Box::new(vec.clone()))?;
                Family::Gauge(vec)
            }
            MetricKind::Counter => {
                let vec = CounterVec::new(opts, desc.labels)?;
                registry.register(Box::new(vec.clone()))?;
                Family::Counter(vec)
            }
        };
        families.push(family);
    }

    for sample in samples {
        let values: Vec<&str> = sample.labels().iter().map(String::as_str).collect();
        match families.get(sample.metric() as usize) {
            Some(Family::Gauge(vec)) => vec
                .get_metric_with_label_values(values.as_slice())?
                .set(sample.value()),
            Some(Family::Counter(vec)) => vec
                .get_metric_with_label_values(values.as_slice())?
                .inc_by(sample.value()),
            None => {}
        }
    }

    TextEncoder::new().encode_to_string(&registry.gather())
}

#[derive(Serialize)]
struct Dump<'a> {
    timestamp: String,
    samples: &'a [Sample],
}

/// Renders samples as one JSON document stamped with the collection time.
pub(crate) fn render_json(
    samples: &[Sample],
    timestamp: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&Dump {
        timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use systemd_exporter_core::collector::MetricId;

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new(MetricId::UnitState, &["foo.service", "service", "active"], 1.0),
            Sample::new(MetricId::UnitState, &["foo.service", "service", "failed"], 0.0),
            Sample::new(MetricId::UnitTasksCurrent, &["foo.service"], 4.0),
            Sample::new(MetricId::ServiceRestartTotal, &["foo.service"], 2.0),
            Sample::new(
                MetricId::UnitCpuSecondsTotal,
                &["foo.service", "service", "user"],
                0.06,
            ),
        ]
    }

    #[test]
    fn test_render_text() {
        let text = render_text(&samples()).unwrap();

        assert!(text.contains("# HELP systemd_unit_tasks_current Current number of tasks per Systemd unit"));
        assert!(text.contains("# TYPE systemd_unit_tasks_current gauge"));
        assert!(text.contains("# TYPE systemd_service_restart_total counter"));
        assert!(text.contains("# TYPE systemd_unit_cpu_seconds_total counter"));
        assert!(
            text.lines()
                .any(|l| l.starts_with("systemd_unit_tasks_current{name=\"foo.service\"} 4"))
        );
        assert!(
            text.lines()
                .any(|l| l.starts_with("systemd_service_restart_total{state=\"foo.service\"} 2"))
        );
        assert_eq!(
            text.lines()
                .filter(|l| l.starts_with("systemd_unit_state{"))
                .count(),
            2
        );
    }

    #[test]
    fn test_render_text_skips_empty_families() {
        let text = render_text(&samples()).unwrap();
        assert!(!text.contains("systemd_timer_last_trigger_seconds"));
        assert!(!text.contains("systemd_process_open_fds"));
    }

    #[test]
    fn test_render_text_empty() {
        assert_eq!(render_text(&[]).unwrap(), "");
    }

    #[test]
    fn test_render_json() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let json = render_json(&samples()[2..3], timestamp).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["timestamp"], "2024-05-01T12:00:00Z");
        assert_eq!(value["samples"][0]["name"], "systemd_unit_tasks_current");
        assert_eq!(value["samples"][0]["kind"], "gauge");
        assert_eq!(value["samples"][0]["labels"]["name"], "foo.service");
        assert_eq!(value["samples"][0]["value"], 4.0);
    }
}
