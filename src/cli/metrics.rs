use anyhow::Result;

use rapport::config::RapportConfig;
use rapport::memory::metrics::{MetricsOptions, MetricsPeriod};

pub async fn metrics(
    config: &RapportConfig,
    partner_id: &str,
    include_history: bool,
    period: Option<MetricsPeriod>,
) -> Result<()> {
    let service = super::open_service(config, super::Purpose::Read)?;
    let report = service
        .get_relationship_metrics(partner_id, MetricsOptions { include_history, period })
        .await?;
    super::print_json(&report)
}
