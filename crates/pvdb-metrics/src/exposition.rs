//! Text exposition.
//!
//! Picks the response format from the scrape request's `Accept` header and
//! encodes one gather pass with `prometheus_client`: the warehouse families
//! first, then the exporter self-metrics. OpenMetrics responses end with
//! `# EOF`.
//!
//! ```text
//! # HELP pvdb_eod_daily Number of EOD quotes downloaded today
//! # TYPE pvdb_eod_daily gauge
//! pvdb_eod_daily 42.0
//! ```

use crate::registry::MetricFamily;
use prometheus_client::collector::Collector;
use prometheus_client::encoding::{text, DescriptorEncoder, EncodeMetric};
use prometheus_client::metrics::gauge::ConstGauge;
use prometheus_client::registry::Registry;
use std::fmt;

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

const OPENMETRICS_MEDIA_TYPE: &str = "application/openmetrics-text";

/// Exposition format of a scrape response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Prometheus,
    OpenMetrics,
}

impl Format {
    /// Pick the format from an `Accept` header value.
    ///
    /// The acceptable media range with the highest quality wins, ties going
    /// to the one listed first. Ranges that name neither format are skipped;
    /// with nothing acceptable the Prometheus text format is used.
    pub fn negotiate(accept: Option<&str>) -> Self {
        let mut best: Option<(f32, Format)> = None;

        for range in accept.unwrap_or_default().split(',') {
            let mut params = range.split(';').map(str::trim);
            let Some(format) = params.next().and_then(Self::from_media_type) else {
                continue;
            };

            let quality = params
                .find_map(|p| p.strip_prefix("q=").or_else(|| p.strip_prefix("Q=")))
                .map_or(Some(1.0), |q| q.trim().parse::<f32>().ok())
                .unwrap_or(0.0);

            // q=0 means "not acceptable"
            if quality <= 0.0 {
                continue;
            }

            match best {
                Some((best_quality, _)) if quality <= best_quality => {}
                _ => best = Some((quality, format)),
            }
        }

        best.map_or(Format::Prometheus, |(_, format)| format)
    }

    fn from_media_type(media_type: &str) -> Option<Self> {
        if media_type.eq_ignore_ascii_case(OPENMETRICS_MEDIA_TYPE) {
            Some(Format::OpenMetrics)
        } else if ["text/plain", "text/*", "*/*"]
            .iter()
            .any(|t| media_type.eq_ignore_ascii_case(t))
        {
            Some(Format::Prometheus)
        } else {
            None
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Prometheus => PROMETHEUS_CONTENT_TYPE,
            Format::OpenMetrics => OPENMETRICS_CONTENT_TYPE,
        }
    }
}

/// Families from one gather pass, encoded as constant gauges.
#[derive(Debug)]
struct GatheredFamilies(Vec<MetricFamily>);

impl Collector for GatheredFamilies {
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), fmt::Error> {
        for family in &self.0 {
            let desc = &family.desc;
            let mut metric_encoder = encoder.encode_descriptor(
                desc.fq_name(),
                desc.help(),
                None,
                desc.value_type().metric_type(),
            )?;

            for sample in &family.samples {
                let gauge = ConstGauge::new(sample.value());
                if sample.label_values().is_empty() {
                    // ConstGauge::encode consumes the encoder; this is its body.
                    metric_encoder.encode_gauge(&sample.value())?;
                } else {
                    let labels: Vec<(&str, &str)> = sample.labels().collect();
                    let sample_encoder = metric_encoder.encode_family(&labels)?;
                    gauge.encode(sample_encoder)?;
                }
            }
        }

        Ok(())
    }
}

/// Encode `families` followed by the metrics in `self_metrics`.
///
/// # Errors
///
/// Propagates `fmt::Error` from the encoder.
pub fn encode(
    families: Vec<MetricFamily>,
    self_metrics: &Registry,
    format: Format,
) -> Result<String, fmt::Error> {
    let mut scrape = Registry::default();
    scrape.register_collector(Box::new(GatheredFamilies(families)));

    let mut body = String::new();
    text::encode_registry(&mut body, &scrape)?;
    text::encode_registry(&mut body, self_metrics)?;
    if format == Format::OpenMetrics {
        text::encode_eof(&mut body)?;
    }

    Ok(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collector::{MetricDesc, Sample};
    use crate::observability::ExporterMetrics;
    use std::sync::Arc;
    use std::time::Duration;

    fn family(name: &str, help: &str, value: f64) -> MetricFamily {
        let desc = Arc::new(MetricDesc::gauge("pvdb", "", name, help, &[]).unwrap());
        MetricFamily {
            samples: vec![Sample::unlabeled(Arc::clone(&desc), value)],
            desc,
        }
    }

    /// Value of the unlabeled sample `name`.
    fn value_of(body: &str, name: &str) -> Option<f64> {
        body.lines().find_map(|line| {
            let (metric, value) = line.split_once(' ')?;
            if metric != name {
                return None;
            }
            value.parse().ok()
        })
    }

    #[test]
    fn test_negotiate_defaults_to_prometheus() {
        assert_eq!(Format::negotiate(None), Format::Prometheus);
        assert_eq!(Format::negotiate(Some("")), Format::Prometheus);
        assert_eq!(Format::negotiate(Some("*/*")), Format::Prometheus);
        assert_eq!(Format::negotiate(Some("text/plain")), Format::Prometheus);
        assert_eq!(Format::negotiate(Some("application/json")), Format::Prometheus);
    }

    #[test]
    fn test_negotiate_openmetrics() {
        let scraper_accept = "application/openmetrics-text;version=1.0.0;q=0.5,\
                                 text/plain;version=0.0.4;q=0.3,*/*;q=0.1";
        assert_eq!(
            Format::negotiate(Some(scraper_accept)),
            Format::OpenMetrics
        );
        assert_eq!(
            Format::negotiate(Some("Application/OpenMetrics-Text")),
            Format::OpenMetrics
        );
    }

    #[test]
    fn test_negotiate_prefers_higher_quality() {
        let prefers_text = "text/plain;version=0.0.4;q=1.0,\
                            application/openmetrics-text;version=1.0.0;q=0.1";
        assert_eq!(Format::negotiate(Some(prefers_text)), Format::Prometheus);

        let wildcard_last = "*/*;q=0.2, application/openmetrics-text;q=0.9";
        assert_eq!(Format::negotiate(Some(wildcard_last)), Format::OpenMetrics);
    }

    #[test]
    fn test_negotiate_tie_goes_to_first_listed() {
        assert_eq!(
            Format::negotiate(Some("application/openmetrics-text, text/plain")),
            Format::OpenMetrics
        );
        assert_eq!(
            Format::negotiate(Some("text/plain, application/openmetrics-text")),
            Format::Prometheus
        );
    }

    #[test]
    fn test_negotiate_respects_zero_quality() {
        assert_eq!(
            Format::negotiate(Some("application/openmetrics-text;q=0,text/plain")),
            Format::Prometheus
        );
        assert_eq!(
            Format::negotiate(Some("application/openmetrics-text;q=bogus")),
            Format::Prometheus
        );
    }

    #[test]
    fn test_content_types() {
        assert_eq!(
            Format::Prometheus.content_type(),
            "text/plain; version=0.0.4; charset=utf-8"
        );
        assert_eq!(
            Format::OpenMetrics.content_type(),
            "application/openmetrics-text; version=1.0.0; charset=utf-8"
        );
    }

    #[test]
    fn test_encode_gauges_in_order() {
        let families = vec![
            family("eod_daily", "Number of EOD quotes", 42.0),
            family("assets_new", "New assets", 0.0),
        ];

        let body = encode(families, &Registry::default(), Format::Prometheus).unwrap();

        assert!(body.contains("# TYPE pvdb_eod_daily gauge\n"), "{body}");
        assert!(body.contains("# TYPE pvdb_assets_new gauge\n"), "{body}");
        assert_eq!(value_of(&body, "pvdb_eod_daily"), Some(42.0));
        assert_eq!(value_of(&body, "pvdb_assets_new"), Some(0.0));
        assert!(body.find("pvdb_eod_daily") < body.find("pvdb_assets_new"));
        assert!(!body.contains("# EOF"), "{body}");
    }

    #[test]
    fn test_encode_openmetrics_ends_with_eof() {
        let families = vec![family("eod_daily", "Number of EOD quotes", 42.0)];

        let body = encode(families, &Registry::default(), Format::OpenMetrics).unwrap();

        assert!(body.starts_with("# HELP pvdb_eod_daily "), "{body}");
        assert!(body.ends_with("# EOF\n"), "{body}");
        assert_eq!(body.matches("# EOF").count(), 1);
        assert!(!body.contains("\n\n"), "{body}");
    }

    #[test]
    fn test_encode_appends_self_metrics() {
        let mut self_metrics = Registry::default();
        let metrics = ExporterMetrics::new();
        metrics.register(&mut self_metrics);
        metrics.record_query("eod_daily", Some("timeout"), Duration::from_secs(5));

        let body = encode(
            vec![family("eod_daily", "h", 1.0)],
            &self_metrics,
            Format::OpenMetrics,
        )
        .unwrap();

        let warehouse = body.find("pvdb_eod_daily ").unwrap();
        let exporter = body.find("pvdb_exporter_").unwrap();
        assert!(warehouse < exporter, "{body}");
        assert!(body.contains("# TYPE pvdb_exporter_query_failures counter\n"));
        assert!(body.contains(
            "pvdb_exporter_query_failures_total{query=\"eod_daily\",reason=\"timeout\"} 1\n"
        ));
        assert!(body.ends_with("# EOF\n"));
    }

    #[test]
    fn test_encode_labeled_sample() {
        let desc = Arc::new(
            MetricDesc::gauge("pvdb", "eod", "by_source", "Quotes by source", &["source"])
                .unwrap(),
        );
        let families = vec![MetricFamily {
            samples: vec![
                Sample::labeled(Arc::clone(&desc), 2.5, vec!["vendor".to_string()]).unwrap(),
            ],
            desc,
        }];

        let body = encode(families, &Registry::default(), Format::Prometheus).unwrap();

        assert!(
            body.contains("pvdb_eod_by_source{source=\"vendor\"} 2.5\n"),
            "{body}"
        );
    }

    #[test]
    fn test_encode_declared_family_without_samples() {
        let desc = Arc::new(MetricDesc::gauge("pvdb", "", "idle", "Idle", &[]).unwrap());
        let families = vec![MetricFamily {
            desc,
            samples: Vec::new(),
        }];

        let body = encode(families, &Registry::default(), Format::Prometheus).unwrap();

        assert!(body.contains("# TYPE pvdb_idle gauge\n"), "{body}");
        assert_eq!(value_of(&body, "pvdb_idle"), None);
    }
}
