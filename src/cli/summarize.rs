use anyhow::Result;

use rapport::config::RapportConfig;
use rapport::memory::extractor::{EpisodeRequest, SummaryRequest};
use rapport::memory::types::SummaryType;

/// Extract memories from the given messages and print the result.
pub async fn summarize(
    config: &RapportConfig,
    partner_id: String,
    message_ids: Vec<String>,
    summary_type: SummaryType,
    episode_title: Option<String>,
    episode_description: Option<String>,
) -> Result<()> {
    let service = super::open_service(config, super::Purpose::Summarize)?;

    let request = SummaryRequest {
        partner_id,
        message_ids,
        summary_type,
        episode: episode_title.map(|title| EpisodeRequest {
            title,
            description: episode_description,
        }),
    };

    let response = service.create_summary(request).await?;
    super::print_json(&response)
}
