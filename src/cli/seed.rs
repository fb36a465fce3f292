//! Seeding commands for a standalone database: partners and messages.

use anyhow::Result;

use rapport::config::RapportConfig;
use rapport::memory::directory::PartnerDirectory;
use rapport::memory::types::MessageSender;

pub fn add_partner(config: &RapportConfig, user_id: &str, name: &str) -> Result<()> {
    let store = super::open_store(config)?;
    let partner = store.create_partner(user_id, name)?;
    super::print_json(&partner)
}

pub fn list_partners(config: &RapportConfig, user_id: &str) -> Result<()> {
    let store = super::open_store(config)?;
    let partners = store.find_partners_by_user(user_id)?;
    super::print_json(&partners)
}

pub fn add_message(
    config: &RapportConfig,
    partner_id: &str,
    sender: MessageSender,
    content: &str,
) -> Result<()> {
    let store = super::open_store(config)?;
    let message = store.create_message(partner_id, sender, content, None)?;
    super::print_json(&message)
}
