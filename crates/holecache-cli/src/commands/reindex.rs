use anyhow::Result;
use holecache_core::EntityKind;
use serde_json::json;

use super::Context;
use crate::output;

pub fn execute(ctx: &Context, kind: Option<EntityKind>) -> Result<()> {
    let kinds = kind.map_or_else(|| vec![EntityKind::Hole, EntityKind::Floor], |k| vec![k]);
    let store = ctx.store();

    for kind in kinds {
        let index = store.rebuild_index(kind)?;
        if ctx.json {
            output::print_json_line(&json!({
                "kind": kind.dir_name(),
                "ids": index.len(),
                "spans": index.span_count(),
            }))?;
        } else {
            println!(
                "Rebuilt {} index: {} ids in {} spans",
                kind.dir_name(),
                index.len(),
                index.span_count()
            );
        }
    }
    Ok(())
}
