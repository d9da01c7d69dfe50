use anyhow::Result;
use futures::{StreamExt, TryStreamExt};
use holecache_core::{HoleQuery, HoleStart, SortOrder};
use tracing::info;

use super::Context;
use crate::output;

pub async fn execute(
    ctx: &Context,
    order: Option<SortOrder>,
    division: Option<u64>,
    resume: bool,
    limit: Option<usize>,
) -> Result<()> {
    let query = HoleQuery {
        order: order.unwrap_or(ctx.config.defaults.sort_order),
        division,
        start: if resume {
            HoleStart::Resume
        } else {
            HoleStart::Latest
        },
    };
    let limit = limit.unwrap_or(ctx.config.defaults.page_size);

    let mut holes = ctx.pipeline()?.holes(query).take(limit);
    let mut printed = 0usize;
    let mut last_seen = None;
    while let Some(bundle) = holes.try_next().await? {
        output::print_hole(&bundle, ctx.json)?;
        printed += 1;
        last_seen = Some(bundle.hole.id);
    }

    if last_seen.is_some() {
        ctx.sessions().update(|mut state| {
            state.last_position = last_seen;
            state
        })?;
    }
    info!("Listed {printed} holes");
    Ok(())
}
