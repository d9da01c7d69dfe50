use anyhow::Result;
use holecache_core::Config;

use super::Context;
use crate::output;

pub fn execute(ctx: &Context, path: bool) -> Result<()> {
    if path {
        let path = Config::config_path()?;
        if ctx.json {
            return output::print_json_line(&path);
        }
        println!("{}", path.display());
        return Ok(());
    }

    if ctx.json {
        return output::print_json_line(&ctx.config);
    }
    print!("{}", toml::to_string_pretty(&ctx.config)?);
    Ok(())
}
