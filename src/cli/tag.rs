//! Tag CLI commands

use anyhow::Result;
use clap::Subcommand;

use super::app::Context;
use super::output::Output;
use super::category;
use crate::domain::{AdId, CoreResult, Tag, TagId, UserId};
use crate::service::{CategoryManager, TagManager};
use crate::storage::Catalog;

#[derive(Subcommand)]
pub enum TagCommands {
    /// Create a tag
    Add {
        /// Tag name (letters, digits, '-' and '_'; stored lowercase)
        name: String,
    },

    /// Rename a tag
    Rename {
        /// Tag (id or name)
        tag: String,

        /// New name
        name: String,
    },

    /// Delete a tag no ad carries
    Delete {
        /// Tag (id or name)
        tag: String,
    },

    /// Show tag details
    Show {
        /// Tag (id or name)
        tag: String,
    },

    /// List tags, or the tags used by one ad, category or owner
    List {
        /// Only tags on this ad
        #[arg(long, conflicts_with_all = ["category", "owner"])]
        ad: Option<AdId>,

        /// Only tags on ads in this category (id or name)
        #[arg(long, short, conflicts_with = "owner")]
        category: Option<String>,

        /// Include ads in subcategories
        #[arg(long, short, requires = "category")]
        recursive: bool,

        /// Only tags on ads owned by this user
        #[arg(long)]
        owner: Option<String>,
    },

    /// Search tags by name
    Search {
        term: String,
    },

    /// Most used tags
    Popular {
        #[arg(long, short, default_value = "10")]
        limit: usize,
    },

    /// Tags no ad carries
    Unused,

    /// Tags that appear on the same ads
    Related {
        /// Tag (id or name)
        tag: String,

        #[arg(long, short, default_value = "10")]
        limit: usize,
    },

    /// Get or create several tags at once
    Ensure {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

pub fn run(cmd: TagCommands, ctx: &Context) -> Result<()> {
    match cmd {
        TagCommands::Add { name } => add(ctx, &name),
        TagCommands::Rename { tag, name } => rename(ctx, &tag, &name),
        TagCommands::Delete { tag } => delete(ctx, &tag),
        TagCommands::Show { tag } => show(ctx, &tag),
        TagCommands::List {
            ad,
            category,
            recursive,
            owner,
        } => {
            let scope = match (ad, category, owner) {
                (Some(ad), _, _) => Scope::Ad(ad),
                (_, Some(category), _) => Scope::Category(category, recursive),
                (_, _, Some(owner)) => Scope::Owner(UserId::new(&owner)?),
                _ => Scope::All,
            };
            list(ctx, &scope)
        }
        TagCommands::Search { term } => search(ctx, &term),
        TagCommands::Popular { limit } => popular(ctx, limit),
        TagCommands::Unused => unused(ctx),
        TagCommands::Related { tag, limit } => related(ctx, &tag, limit),
        TagCommands::Ensure { names } => ensure(ctx, &names),
    }
}

/// Which tags `tag list` shows
enum Scope {
    All,
    Ad(AdId),
    Category(String, bool),
    Owner(UserId),
}

/// Finds a tag by id, falling back to its name
fn resolve(catalog: &mut Catalog, reference: &str) -> CoreResult<Tag> {
    let manager = TagManager::new(catalog);
    if let Ok(id) = reference.parse::<TagId>() {
        match manager.get(&id) {
            Ok(tag) => return Ok(tag),
            Err(e) if !e.is_not_found() => return Err(e),
            Err(_) => {}
        }
    }
    manager.get_by_name(reference)
}

fn add(ctx: &Context, name: &str) -> Result<()> {
    let project = ctx.project()?;
    let actor = ctx.actor(&project)?;

    let tag = project
        .catalog()
        .transact(|catalog| TagManager::new(catalog).create(name, &actor))?;

    report(&ctx.output, &tag, "Created tag");
    Ok(())
}

fn rename(ctx: &Context, reference: &str, name: &str) -> Result<()> {
    let project = ctx.project()?;
    let actor = ctx.actor(&project)?;

    let tag = project.catalog().transact(|catalog| {
        let id = resolve(catalog, reference)?.id;
        TagManager::new(catalog).rename(&id, name, &actor)
    })?;

    report(&ctx.output, &tag, "Renamed tag");
    Ok(())
}

fn delete(ctx: &Context, reference: &str) -> Result<()> {
    let project = ctx.project()?;

    let tag = project.catalog().transact(|catalog| {
        let id = resolve(catalog, reference)?.id;
        TagManager::new(catalog).delete(&id)
    })?;

    report(&ctx.output, &tag, "Deleted tag");
    Ok(())
}

fn show(ctx: &Context, reference: &str) -> Result<()> {
    let project = ctx.project()?;

    let (tag, ads) = project.catalog().read(|catalog| {
        let tag = resolve(catalog, reference)?;
        let ads = TagManager::new(catalog).ad_count(&tag.id)?;
        Ok((tag, ads))
    })?;

    if ctx.output.is_json() {
        ctx.output.data(&serde_json::json!({ "tag": tag, "ads": ads }));
    } else {
        println!("ID:      {}", tag.id);
        println!("Name:    {}", tag.name);
        println!("Created: {} by {}", tag.created_at.format("%Y-%m-%d %H:%M"), tag.created_by);
        println!("Ads:     {}", ads);
    }
    Ok(())
}

fn list(ctx: &Context, scope: &Scope) -> Result<()> {
    let project = ctx.project()?;
    let tags = project.catalog().read(|catalog| match scope {
        Scope::All => TagManager::new(catalog).list(),
        Scope::Ad(ad) => TagManager::new(catalog).for_ad(ad),
        Scope::Category(reference, recursive) => {
            let id = category::resolve(&CategoryManager::new(&mut *catalog), reference)?.id;
            TagManager::new(catalog).by_category(&id, *recursive)
        }
        Scope::Owner(owner) => TagManager::new(catalog).by_creator(owner),
    })?;

    print_tags(&ctx.output, &tags, "No tags found");
    Ok(())
}

fn search(ctx: &Context, term: &str) -> Result<()> {
    let project = ctx.project()?;
    let tags = project
        .catalog()
        .read(|catalog| TagManager::new(catalog).search(term))?;

    print_tags(&ctx.output, &tags, &format!("No tags match '{}'", term));
    Ok(())
}

fn popular(ctx: &Context, limit: usize) -> Result<()> {
    let project = ctx.project()?;
    let ranked = project
        .catalog()
        .read(|catalog| TagManager::new(catalog).popular(limit))?;

    print_ranked(&ctx.output, &ranked, "No tag is in use");
    Ok(())
}

fn unused(ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let tags = project
        .catalog()
        .read(|catalog| TagManager::new(catalog).unused())?;

    print_tags(&ctx.output, &tags, "Every tag is in use");
    Ok(())
}

fn related(ctx: &Context, reference: &str, limit: usize) -> Result<()> {
    let project = ctx.project()?;
    let ranked = project.catalog().read(|catalog| {
        let id = resolve(catalog, reference)?.id;
        TagManager::new(catalog).related(&id, limit)
    })?;

    print_ranked(&ctx.output, &ranked, "No related tags");
    Ok(())
}

fn ensure(ctx: &Context, names: &[String]) -> Result<()> {
    let project = ctx.project()?;
    let actor = ctx.actor(&project)?;

    let tags = project
        .catalog()
        .transact(|catalog| TagManager::new(catalog).ensure(names, &actor))?;

    print_tags(&ctx.output, &tags, "");
    Ok(())
}

fn report(output: &Output, tag: &Tag, verb: &str) {
    if output.is_json() {
        output.data(tag);
    } else {
        output.success(&format!("{} {}: {}", verb, tag.id, tag.name));
    }
}

fn print_tags(output: &Output, tags: &[Tag], empty: &str) {
    if output.is_json() {
        output.data(&tags);
        return;
    }

    if tags.is_empty() && !empty.is_empty() {
        println!("{}", empty);
    }
    for tag in tags {
        println!("{}  {}", tag.id, tag.name);
    }
}

fn print_ranked(output: &Output, ranked: &[(Tag, usize)], empty: &str) {
    if output.is_json() {
        let rows: Vec<_> = ranked
            .iter()
            .map(|(t, n)| serde_json::json!({ "tag": t, "ads": n }))
            .collect();
        output.data(&rows);
        return;
    }

    if ranked.is_empty() {
        println!("{}", empty);
    }
    for (tag, ads) in ranked {
        println!("{:>5}  {}  {}", ads, tag.id, tag.name);
    }
}
