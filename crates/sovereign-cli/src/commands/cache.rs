use sovereign_core::util::now_millis;
use sovereign_core::CacheManager;

use crate::cli::CacheCommands;
use crate::commands::common::{format_cache_line, print_json, CliContext};
use crate::error::CliError;

pub async fn run_cache(context: &CliContext, command: CacheCommands) -> Result<(), CliError> {
    let store = context.open_store().await?;
    let cache = CacheManager::new(store.clone());

    match command {
        CacheCommands::Get { id } => {
            let content = cache.get(&id).await?.ok_or(CliError::CacheMiss(id))?;
            print_json(&content)
        }
        CacheCommands::List { content_type, json } => {
            let entries = match content_type {
                Some(content_type) => cache.get_by_type(&content_type).await?,
                None => {
                    let now = now_millis();
                    store
                        .list_content()
                        .await?
                        .into_iter()
                        .filter(|content| !content.is_expired_at(now))
                        .collect()
                }
            };

            if json {
                return print_json(&entries);
            }
            if entries.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }
            let now = now_millis();
            for content in &entries {
                println!("{}", format_cache_line(content, now));
            }
            Ok(())
        }
        CacheCommands::Sweep => {
            let removed = cache.sweep_expired().await?;
            println!("Removed {removed} expired entr{}", if removed == 1 { "y" } else { "ies" });
            Ok(())
        }
    }
}
