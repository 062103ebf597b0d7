//! Advertisement CLI commands

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use rust_decimal::Decimal;

use super::app::{parse_date, Context};
use super::category::{resolve, resolve_all};
use super::output::Output;
use crate::domain::{Ad, AdId, AdStatus, CoreResult, TagId, UserId};
use crate::service::{AdDraft, AdFilter, AdManager, AdUpdate, CategoryManager, TagManager};
use crate::storage::{Catalog, Project};

#[derive(Subcommand)]
pub enum AdCommands {
    /// Create an ad (a draft unless --publish is given)
    ///
    /// Examples:
    ///   adboard ad add "Road bike" "Steel frame, 56cm, new tyres" --price 250
    ///   adboard ad add "Vintage lamp" "Brass, works fine" -c Furniture -t retro --publish
    Add {
        /// Title (5 to 100 characters)
        title: String,

        /// Description (20 to 2000 characters)
        description: String,

        /// Asking price
        #[arg(long)]
        price: Option<Decimal>,

        /// Publish right away
        #[arg(long)]
        publish: bool,

        /// Expiration date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_date)]
        expires: Option<DateTime<Utc>>,

        /// Mark as featured
        #[arg(long)]
        featured: bool,

        /// Category (id or name, repeatable)
        #[arg(long = "category", short = 'c')]
        categories: Vec<String>,

        /// Tag name, created if missing (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
    },

    /// Change an ad you own
    Update {
        /// Ad ID
        id: AdId,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, conflicts_with = "clear_price")]
        price: Option<Decimal>,

        /// Remove the price
        #[arg(long)]
        clear_price: bool,

        /// New status, checked against the allowed transitions
        #[arg(long)]
        status: Option<AdStatus>,

        /// Expiration date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_date)]
        expires: Option<DateTime<Utc>>,

        /// Featured flag (true or false)
        #[arg(long)]
        featured: Option<bool>,

        /// Replace the categories (id or name, repeatable)
        #[arg(long = "category", short = 'c')]
        categories: Vec<String>,

        /// Replace the tags (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
    },

    /// Show ad details
    Show {
        /// Ad ID
        id: AdId,
    },

    /// List ads (everything but deleted ones by default)
    List {
        /// Only this status
        #[arg(long, short)]
        status: Option<AdStatus>,

        /// Only ads in this category (id or name)
        #[arg(long, short)]
        category: Option<String>,

        /// With --category, include its subcategories
        #[arg(long, short, requires = "category")]
        recursive: bool,

        /// Only ads with this tag
        #[arg(long, short)]
        tag: Option<String>,

        /// Only ads owned by this user
        #[arg(long, conflicts_with = "mine")]
        owner: Option<String>,

        /// Only your own ads
        #[arg(long)]
        mine: bool,

        /// Only featured ads
        #[arg(long)]
        featured: bool,

        #[arg(long)]
        min_price: Option<Decimal>,

        #[arg(long)]
        max_price: Option<Decimal>,

        /// Text in the title or description
        #[arg(long)]
        text: Option<String>,

        /// Maximum number of ads
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Move an ad to another status
    ///
    /// Allowed: draft -> published|deleted, published -> suspended|expired|deleted,
    /// suspended -> published|deleted, expired -> published|deleted.
    Status {
        /// Ad ID
        id: AdId,

        /// Target status
        status: AdStatus,

        /// Expiration date when publishing
        #[arg(long, value_parser = parse_date)]
        expires: Option<DateTime<Utc>>,
    },

    /// Publish an ad
    Publish {
        /// Ad ID
        id: AdId,

        /// Expiration date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_date)]
        expires: Option<DateTime<Utc>>,
    },

    /// Soft-delete an ad
    Delete {
        /// Ad ID
        id: AdId,
    },

    /// Record a view
    View {
        /// Ad ID
        id: AdId,
    },

    /// Expire every published ad past its expiration date
    Expire,

    /// Published ads expiring soon
    Expiring {
        /// Window in days (defaults to the project setting)
        #[arg(long, short)]
        days: Option<u32>,
    },

    /// Published featured ads
    Featured,

    /// Most viewed published ads
    Popular {
        #[arg(long, short, default_value = "10")]
        limit: usize,
    },

    /// Recently published ads
    Recent {
        /// Window in days (defaults to the project setting)
        #[arg(long, short)]
        days: Option<u32>,
    },

    /// Full-text search over titles and descriptions
    Search {
        /// Search terms
        query: String,

        #[arg(long, short, default_value = "20")]
        limit: usize,
    },
}

pub fn run(cmd: AdCommands, ctx: &Context) -> Result<()> {
    match cmd {
        AdCommands::Add {
            title,
            description,
            price,
            publish,
            expires,
            featured,
            categories,
            tags,
        } => {
            let mut draft = AdDraft::new(title, description);
            draft.price = price;
            draft.expires_at = expires;
            draft.featured = featured;
            if publish {
                draft.status = AdStatus::Published;
            }
            add(ctx, draft, &categories, &tags)
        }
        AdCommands::Update {
            id,
            title,
            description,
            price,
            clear_price,
            status,
            expires,
            featured,
            categories,
            tags,
        } => {
            let changes = AdUpdate {
                title,
                description,
                price: if clear_price { Some(None) } else { price.map(Some) },
                status,
                expires_at: expires,
                featured,
                ..AdUpdate::default()
            };
            update(ctx, &id, changes, &categories, &tags)
        }
        AdCommands::Show { id } => show(ctx, &id),
        AdCommands::List {
            status,
            category,
            recursive,
            tag,
            owner,
            mine,
            featured,
            min_price,
            max_price,
            text,
            limit,
        } => {
            let filter = AdFilter {
                status,
                include_subcategories: recursive,
                featured_only: featured,
                min_price,
                max_price,
                text,
                limit,
                ..AdFilter::default()
            };
            list(ctx, filter, category.as_deref(), tag.as_deref(), owner, mine)
        }
        AdCommands::Status {
            id,
            status,
            expires,
        } => transition(ctx, &id, status, expires),
        AdCommands::Publish { id, expires } => transition(ctx, &id, AdStatus::Published, expires),
        AdCommands::Delete { id } => transition(ctx, &id, AdStatus::Deleted, None),
        AdCommands::View { id } => view(ctx, &id),
        AdCommands::Expire => expire(ctx),
        AdCommands::Expiring { days } => expiring(ctx, days),
        AdCommands::Featured => featured(ctx),
        AdCommands::Popular { limit } => popular(ctx, limit),
        AdCommands::Recent { days } => recent(ctx, days),
        AdCommands::Search { query, limit } => search(ctx, &query, limit),
    }
}

fn default_ttl(project: &Project) -> Option<Duration> {
    project
        .config()
        .project
        .default_expiration_days
        .map(|days| Duration::days(i64::from(days)))
}

fn ensure_tags(catalog: &mut Catalog, names: &[String], actor: &UserId) -> CoreResult<BTreeSet<TagId>> {
    let tags = TagManager::new(catalog).ensure(names, actor)?;
    Ok(tags.into_iter().map(|t| t.id).collect())
}

fn add(ctx: &Context, mut draft: AdDraft, categories: &[String], tags: &[String]) -> Result<()> {
    let project = ctx.project()?;
    let actor = ctx.actor(&project)?;
    let ttl = default_ttl(&project);

    let ad = project.catalog().transact(|catalog| {
        draft.categories = resolve_all(catalog, categories)?;
        draft.tags = ensure_tags(catalog, tags, &actor)?;
        AdManager::new(catalog)
            .with_default_ttl(ttl)
            .create(draft, &actor)
    })?;

    report(&ctx.output, &ad, "Created ad");
    Ok(())
}

fn update(
    ctx: &Context,
    id: &AdId,
    mut changes: AdUpdate,
    categories: &[String],
    tags: &[String],
) -> Result<()> {
    let project = ctx.project()?;
    let actor = ctx.actor(&project)?;
    let ttl = default_ttl(&project);

    let ad = project.catalog().transact(|catalog| {
        if !categories.is_empty() {
            changes.categories = Some(resolve_all(catalog, categories)?);
        }
        if !tags.is_empty() {
            changes.tags = Some(ensure_tags(catalog, tags, &actor)?);
        }
        AdManager::new(catalog)
            .with_default_ttl(ttl)
            .update(id, changes, &actor)
    })?;

    report(&ctx.output, &ad, "Updated ad");
    Ok(())
}

fn show(ctx: &Context, id: &AdId) -> Result<()> {
    let project = ctx.project()?;

    let (ad, tags) = project.catalog().read(|catalog| {
        let ad = AdManager::new(catalog).get(id)?;
        let tags = TagManager::new(catalog).for_ad(id)?;
        Ok((ad, tags))
    })?;

    if ctx.output.is_json() {
        ctx.output.data(&serde_json::json!({
            "ad": ad,
            "tag_names": tags.iter().map(|t| &t.name).collect::<Vec<_>>(),
        }));
        return Ok(());
    }

    println!("ID:        {}", ad.id);
    println!("Title:     {}", ad.title);
    println!("Status:    {}", ad.status);
    if let Some(price) = ad.price {
        println!("Price:     {}", price);
    }
    println!("Owner:     {}", ad.owner);
    println!("Created:   {}", ad.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(at) = ad.published_at {
        println!("Published: {}", at.format("%Y-%m-%d %H:%M"));
    }
    if let Some(at) = ad.expires_at {
        println!("Expires:   {}", at.format("%Y-%m-%d %H:%M"));
    }
    println!("Views:     {}", ad.views);
    if ad.featured {
        println!("Featured:  yes");
    }
    if !tags.is_empty() {
        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        println!("Tags:      {}", names.join(", "));
    }
    println!();
    println!("{}", ad.description);
    Ok(())
}

fn list(
    ctx: &Context,
    mut filter: AdFilter,
    category: Option<&str>,
    tag: Option<&str>,
    owner: Option<String>,
    mine: bool,
) -> Result<()> {
    let project = ctx.project()?;
    filter.owner = match (owner, mine) {
        (Some(name), _) => Some(UserId::new(&name)?),
        (None, true) => Some(ctx.actor(&project)?),
        (None, false) => None,
    };

    let ads = project.catalog().read(|catalog| {
        if let Some(category) = category {
            filter.category = Some(resolve(&CategoryManager::new(catalog), category)?.id);
        }
        if let Some(tag) = tag {
            filter.tag = Some(TagManager::new(catalog).get_by_name(tag)?.id);
        }
        AdManager::new(catalog).list(&filter)
    })?;

    print_ads(&ctx.output, &ads, "No ads found");
    Ok(())
}

fn transition(
    ctx: &Context,
    id: &AdId,
    next: AdStatus,
    expires: Option<DateTime<Utc>>,
) -> Result<()> {
    let project = ctx.project()?;
    let actor = ctx.actor(&project)?;
    let ttl = default_ttl(&project);

    let ad = project.catalog().transact(|catalog| {
        AdManager::new(catalog)
            .with_default_ttl(ttl)
            .transition(id, next, expires, &actor)
    })?;

    report(&ctx.output, &ad, &format!("Ad is now {}:", ad.status));
    Ok(())
}

fn view(ctx: &Context, id: &AdId) -> Result<()> {
    let project = ctx.project()?;
    let views = project
        .catalog()
        .transact(|catalog| AdManager::new(catalog).increment_views(id))?;

    if ctx.output.is_json() {
        ctx.output.data(&serde_json::json!({ "id": id, "views": views }));
    } else {
        println!("{}", views);
    }
    Ok(())
}

fn expire(ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let expired = project
        .catalog()
        .transact(|catalog| AdManager::new(catalog).mark_expired(Utc::now()))?;

    if ctx.output.is_json() {
        ctx.output.data(&serde_json::json!({ "expired": expired }));
    } else {
        ctx.output.success(&format!("Expired {} ad(s)", expired));
    }
    Ok(())
}

fn expiring(ctx: &Context, days: Option<u32>) -> Result<()> {
    let project = ctx.project()?;
    let days = days.unwrap_or(project.config().project.expiring_soon_days);
    let ads = project
        .catalog()
        .read(|catalog| AdManager::new(catalog).expiring_within(Utc::now(), days))?;

    print_ads(&ctx.output, &ads, &format!("No ads expire in the next {} days", days));
    Ok(())
}

fn featured(ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let ads = project
        .catalog()
        .read(|catalog| AdManager::new(catalog).featured())?;

    print_ads(&ctx.output, &ads, "No featured ads");
    Ok(())
}

fn popular(ctx: &Context, limit: usize) -> Result<()> {
    let project = ctx.project()?;
    let ads = project
        .catalog()
        .read(|catalog| AdManager::new(catalog).most_viewed(limit))?;

    print_ads(&ctx.output, &ads, "No published ads");
    Ok(())
}

fn recent(ctx: &Context, days: Option<u32>) -> Result<()> {
    let project = ctx.project()?;
    let days = days.unwrap_or(project.config().project.recent_days);
    let ads = project
        .catalog()
        .read(|catalog| AdManager::new(catalog).recently_published(Utc::now(), days))?;

    print_ads(&ctx.output, &ads, &format!("Nothing published in the last {} days", days));
    Ok(())
}

fn search(ctx: &Context, query: &str, limit: usize) -> Result<()> {
    let project = ctx.project()?;
    let cache = project.get_or_rebuild_cache()?;
    let hits = cache.search_ads(query, limit)?;

    if ctx.output.is_json() {
        ctx.output.data(&hits);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No ads match '{}'", query);
    }
    for hit in &hits {
        println!("{}  [{}] {}", hit.id, hit.status, hit.title);
        println!("    {}", hit.snippet);
    }
    Ok(())
}

fn report(output: &Output, ad: &Ad, verb: &str) {
    if output.is_json() {
        output.data(ad);
    } else {
        output.success(&format!("{} {} {}", verb, ad.id, ad.title));
    }
}

fn print_ads(output: &Output, ads: &[Ad], empty: &str) {
    if output.is_json() {
        output.data(&ads);
        return;
    }

    if ads.is_empty() {
        println!("{}", empty);
    }
    for ad in ads {
        let price = ad.price.map(|p| p.to_string()).unwrap_or_default();
        println!("{}  {:<9} {:>10}  {}", ad.id, ad.status.to_string(), price, ad.title);
    }
}
