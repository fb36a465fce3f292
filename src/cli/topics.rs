use anyhow::Result;

use rapport::config::RapportConfig;
use rapport::memory::topics::TopicQuery;
use rapport::memory::types::TopicFilter;

pub async fn topics(
    config: &RapportConfig,
    partner_id: &str,
    limit: Option<usize>,
    status: TopicFilter,
    min_importance: Option<f64>,
) -> Result<()> {
    let service = super::open_service(config, super::Purpose::Read)?;
    let topics = service
        .get_ongoing_topics(
            partner_id,
            TopicQuery {
                limit,
                status,
                min_importance,
            },
        )
        .await?;
    super::print_json(&topics)
}
