use anyhow::Result;

use rapport::config::RapportConfig;
use rapport::memory::search::SearchRequest;
use rapport::memory::types::MemoryType;

/// Search a partner's memories and print ranked results.
pub async fn search(
    config: &RapportConfig,
    partner_id: String,
    query: String,
    memory_types: Vec<MemoryType>,
    limit: Option<usize>,
    min_importance: f64,
) -> Result<()> {
    let service = super::open_service(config, super::Purpose::Search)?;

    let request = SearchRequest {
        partner_id,
        query,
        memory_types: (!memory_types.is_empty()).then_some(memory_types),
        limit,
        min_importance,
    };

    let response = service.search_memories(request).await?;
    super::print_json(&response)
}
