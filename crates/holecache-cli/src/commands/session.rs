use anyhow::Result;
use serde::Serialize;

use super::Context;
use crate::output;

pub fn execute(ctx: &Context, hole: Option<u64>) -> Result<()> {
    let sessions = ctx.sessions();
    match hole {
        Some(hole) => render(ctx, &sessions.get_hole(hole)),
        None => render(ctx, &sessions.get()),
    }
}

fn render<T: Serialize>(ctx: &Context, state: &T) -> Result<()> {
    if ctx.json {
        return output::print_json_line(state);
    }
    print!("{}", toml::to_string_pretty(state)?);
    Ok(())
}
