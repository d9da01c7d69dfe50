//! Rendering of listed entities.
//!
//! Text mode prints one compact block per entity; JSON mode prints one document per line
//! so listings can be piped into `jq` while they stream.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use holecache_core::{Floor, HoleBundle};
use serde::Serialize;

/// Longest floor excerpt printed in text mode.
const EXCERPT_CHARS: usize = 120;

/// Print one serializable value as a single JSON line.
pub fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub fn print_hole(bundle: &HoleBundle, json: bool) -> Result<()> {
    if json {
        return print_json_line(bundle);
    }

    let hole = &bundle.hole;
    let mut header = format!(
        "{} {} replies, {} views, updated {}",
        format!("#{}", hole.id).bold(),
        hole.reply,
        hole.view,
        timestamp(hole.time_updated)
    );
    if hole.division_id != 0 {
        header.push_str(&format!(" in division {}", hole.division_id));
    }
    if hole.is_deleted() {
        header.push_str(&format!(" {}", "[deleted]".red()));
    }
    if hole.locked {
        header.push_str(&format!(" {}", "[locked]".yellow()));
    }
    println!("{header}");

    if !bundle.tags.is_empty() {
        let tags: Vec<_> = bundle.tags.iter().map(|t| t.name.as_str()).collect();
        println!("  {}", tags.join(", ").cyan());
    }
    if let Some(first) = &bundle.first_floor {
        println!("  {}", excerpt(&first.content));
    }
    let first_id = bundle.first_floor.as_ref().map(|f| f.id);
    if let Some(last) = bundle.last_floor.as_ref().filter(|f| Some(f.id) != first_id) {
        println!("  {} {}", "latest:".dimmed(), excerpt(&last.content));
    }
    Ok(())
}

pub fn print_floor(floor: &Floor, json: bool) -> Result<()> {
    if json {
        return print_json_line(floor);
    }

    let author = if floor.anonyname.is_empty() {
        "anonymous"
    } else {
        floor.anonyname.as_str()
    };
    println!(
        "{} {} {} (+{} -{})",
        format!("##{}", floor.id).bold(),
        author.green(),
        timestamp(floor.time_created).dimmed(),
        floor.like,
        floor.dislike
    );
    if floor.deleted {
        println!("  {}", "[deleted]".red());
    } else if !floor.fold.is_empty() {
        println!("  {} {}", "[folded]".yellow(), floor.fold.join("; "));
    } else {
        println!("  {}", floor.content.trim());
    }
    Ok(())
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "unknown".to_string(),
        |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}

fn excerpt(content: &str) -> String {
    let line = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() > EXCERPT_CHARS {
        let cut: String = line.chars().take(EXCERPT_CHARS).collect();
        format!("{cut}…")
    } else {
        line
    }
}
