use anyhow::Result;

use rapport::config::RapportConfig;
use rapport::memory::stats::RankedValue;
use rapport::memory::types::MemoryType;

/// Display memory and episode statistics for one partner.
pub async fn stats(config: &RapportConfig, partner_id: &str) -> Result<()> {
    let service = super::open_service(config, super::Purpose::Read)?;
    let memories = service.memory_stats(partner_id).await?;
    let episodes = service.episode_stats(partner_id).await?;

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total memories:      {}", memories.total_memories);
    println!("  Average importance:  {:.2}", memories.average_importance);
    println!("  Without embedding:   {}", memories.unembedded);
    println!();

    println!("By Type:");
    for t in MemoryType::ALL {
        let count = memories.by_type.get(t.as_str()).copied().unwrap_or(0);
        println!("  {:<14} {}", t.as_str(), count);
    }
    println!();

    if let Some(ref oldest) = memories.oldest_memory {
        println!("Oldest memory:         {oldest}");
    }
    if let Some(ref newest) = memories.newest_memory {
        println!("Newest memory:         {newest}");
    }
    println!();

    println!("Episode Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total episodes:      {}", episodes.total_episodes);
    println!("  Average weight:      {:.2}", episodes.average_emotional_weight);
    print_ranking("Most common tags:", &episodes.most_common_tags);
    print_ranking("Frequent participants:", &episodes.frequent_participants);

    Ok(())
}

fn print_ranking(heading: &str, values: &[RankedValue]) {
    if values.is_empty() {
        return;
    }
    println!();
    println!("{heading}");
    for v in values {
        println!("  {:<20} {}", v.value, v.count);
    }
}
