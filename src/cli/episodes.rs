use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use rapport::config::RapportConfig;
use rapport::memory::episodes::EpisodeQuery;
use rapport::memory::types::parse_timestamp;

/// Build an episode query from command-line flags. Dates are RFC 3339.
pub fn build_query(
    limit: Option<usize>,
    min_emotional_weight: Option<f64>,
    tags: Vec<String>,
    start_date: Option<String>,
    end_date: Option<String>,
) -> Result<EpisodeQuery> {
    Ok(EpisodeQuery {
        limit,
        min_emotional_weight,
        tags: (!tags.is_empty()).then_some(tags),
        start_date: parse_date(start_date.as_deref(), "start-date")?,
        end_date: parse_date(end_date.as_deref(), "end-date")?,
    })
}

fn parse_date(raw: Option<&str>, flag: &str) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(s).with_context(|| format!("--{flag} is not an RFC 3339 timestamp: {s}")))
        .transpose()
}

pub async fn episodes(config: &RapportConfig, partner_id: &str, query: EpisodeQuery) -> Result<()> {
    let service = super::open_service(config, super::Purpose::Read)?;
    let episodes = service.get_episodes(partner_id, query).await?;
    super::print_json(&episodes)
}
