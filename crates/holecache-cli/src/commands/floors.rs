use anyhow::Result;
use futures::{StreamExt, TryStreamExt};
use holecache_core::{FloorQuery, FloorStart};
use tracing::info;

use super::Context;
use crate::output;

pub async fn execute(
    ctx: &Context,
    hole: u64,
    reversed: Option<bool>,
    resume: bool,
    offset: Option<u64>,
    limit: Option<usize>,
) -> Result<()> {
    let start = match (resume, offset) {
        (true, _) => FloorStart::Resume,
        (false, Some(offset)) => FloorStart::Offset(offset),
        (false, None) => FloorStart::Beginning,
    };
    let query = FloorQuery {
        hole_id: hole,
        reversed,
        start,
    };

    let mut floors = ctx.pipeline()?.floors(query).take(limit.unwrap_or(usize::MAX));
    let mut printed = 0usize;
    let mut last_seen = None;
    while let Some(floor) = floors.try_next().await? {
        output::print_floor(&floor, ctx.json)?;
        printed += 1;
        last_seen = Some(floor.id);
    }

    if last_seen.is_some() || reversed.is_some() {
        ctx.sessions().update_hole(hole, |mut state| {
            if let Some(reversed) = reversed {
                state.reversed = reversed;
            }
            state.last_position = last_seen.or(state.last_position);
            state
        })?;
    }
    info!("Listed {printed} floors of hole {hole}");
    Ok(())
}
