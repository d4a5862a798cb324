use crate::app::AppContext;
use anyhow::{Context, Result};

pub async fn execute(ctx: &AppContext) -> Result<()> {
    let key = &ctx.config().cache.list_key;
    ctx.coordinator()
        .flush_cache()
        .await
        .with_context(|| format!("Failed to flush cache key '{}'", key))?;
    println!("✅ Flushed '{}'", key);
    Ok(())
}
