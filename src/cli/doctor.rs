//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use rapport::config::RapportConfig;
use rapport::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &RapportConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `rapport partner add <user-id> <name>` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Rapport Health Report");
    println!("=====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Embedding model:");
    println!("  Stored:          {}", report.embedding_model.as_deref().unwrap_or("(not set)"));
    println!("  Provider:        {}", config.embedding.provider);
    println!("  Configured:      {}", config.embedding.model);
    println!("Extraction model:  {} ({})", config.extraction.model, config.extraction.provider);
    println!();
    println!("Row counts:");
    println!("  Partners:        {}", report.partner_count);
    println!("  Messages:        {}", report.message_count);
    println!("  Memories:        {}", report.memory_count);
    println!("    no vector:     {}", report.unembedded_memory_count);
    println!("  Episodes:        {}", report.episode_count);
    println!("  Metrics rows:    {}", report.metrics_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery: restore from a backup, e.g. cp backup.db {}", db_path.display());
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
