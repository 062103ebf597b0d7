//! Category CLI commands

use std::collections::BTreeSet;

use anyhow::Result;
use clap::Subcommand;

use super::app::Context;
use super::output::Output;
use crate::domain::{Category, CategoryDraft, CategoryId, CategoryNode, CoreResult};
use crate::service::CategoryManager;
use crate::storage::{Catalog, CategoryReader};

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Create a category
    ///
    /// Examples:
    ///   adboard category add Vehicles
    ///   adboard category add Cars --parent Vehicles
    Add {
        /// Category name (unique, case-insensitive)
        name: String,

        /// Optional description
        #[arg(long, short)]
        description: Option<String>,

        /// Parent category (id or name)
        #[arg(long, short)]
        parent: Option<String>,
    },

    /// Change a category's name, description or parent
    Update {
        /// Category (id or name)
        category: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New description
        #[arg(long, short)]
        description: Option<String>,

        /// Remove the description
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,

        /// New parent (id or name)
        #[arg(long, short, conflicts_with = "root")]
        parent: Option<String>,

        /// Make it a top-level category
        #[arg(long)]
        root: bool,
    },

    /// Move a category under another one, or to the top level
    Move {
        /// Category to move (id or name)
        category: String,

        /// New parent (id or name)
        #[arg(required_unless_present = "root", conflicts_with = "root")]
        parent: Option<String>,

        /// Move to the top level
        #[arg(long)]
        root: bool,
    },

    /// Delete a category without subcategories or ads
    Delete {
        /// Category (id or name)
        category: String,
    },

    /// Show category details
    Show {
        /// Category (id or name)
        category: String,
    },

    /// List the children of a category (top level by default)
    List {
        /// Parent category (id or name)
        #[arg(long, short)]
        parent: Option<String>,
    },

    /// Show the whole hierarchy with ad counts
    Tree,

    /// Show the path from the top level down to a category
    Path {
        /// Category (id or name)
        category: String,
    },

    /// Count the ads in a category
    Count {
        /// Category (id or name)
        category: String,

        /// Include ads in every subcategory
        #[arg(long, short)]
        recursive: bool,
    },

    /// Flat list for pickers
    Select,

    /// Search categories by name or description
    Search {
        /// Text to look for
        term: String,
    },

    /// Categories with the most ads
    Popular {
        /// Maximum number of categories
        #[arg(long, short, default_value = "10")]
        limit: usize,
    },

    /// Categories no ad uses
    Unused,
}

pub fn run(cmd: CategoryCommands, ctx: &Context) -> Result<()> {
    match cmd {
        CategoryCommands::Add {
            name,
            description,
            parent,
        } => add(ctx, name, description, parent),
        CategoryCommands::Update {
            category,
            name,
            description,
            clear_description,
            parent,
            root,
        } => {
            let description = if clear_description {
                Some(None)
            } else {
                description.map(Some)
            };
            update(ctx, &category, name, description, parent, root)
        }
        CategoryCommands::Move {
            category,
            parent,
            root,
        } => move_category(ctx, &category, if root { None } else { parent }),
        CategoryCommands::Delete { category } => delete(ctx, &category),
        CategoryCommands::Show { category } => show(ctx, &category),
        CategoryCommands::List { parent } => list(ctx, parent.as_deref()),
        CategoryCommands::Tree => tree(ctx),
        CategoryCommands::Path { category } => path(ctx, &category),
        CategoryCommands::Count {
            category,
            recursive,
        } => count(ctx, &category, recursive),
        CategoryCommands::Select => select(ctx),
        CategoryCommands::Search { term } => search(ctx, &term),
        CategoryCommands::Popular { limit } => popular(ctx, limit),
        CategoryCommands::Unused => unused(ctx),
    }
}

/// Finds a category by id, falling back to its name
pub(super) fn resolve<S: CategoryReader + ?Sized>(
    manager: &CategoryManager<'_, S>,
    reference: &str,
) -> CoreResult<Category> {
    if let Ok(id) = reference.parse::<CategoryId>() {
        match manager.get(&id) {
            Ok(category) => return Ok(category),
            Err(e) if !e.is_not_found() => return Err(e),
            Err(_) => {}
        }
    }
    manager.get_by_name(reference)
}

/// Resolves several references at once
pub(super) fn resolve_all(
    catalog: &mut Catalog,
    references: &[String],
) -> CoreResult<BTreeSet<CategoryId>> {
    let manager = CategoryManager::new(catalog);
    references
        .iter()
        .map(|r| resolve(&manager, r).map(|c| c.id))
        .collect()
}

fn add(
    ctx: &Context,
    name: String,
    description: Option<String>,
    parent: Option<String>,
) -> Result<()> {
    let project = ctx.project()?;
    let actor = ctx.actor(&project)?;

    let category = project.catalog().transact(|catalog| {
        let mut manager = CategoryManager::new(catalog);
        let mut draft = CategoryDraft::new(name);
        draft.description = description;
        if let Some(parent) = parent.as_deref() {
            draft.parent_id = Some(resolve(&manager, parent)?.id);
        }
        manager.create(draft, &actor)
    })?;

    report(&ctx.output, &category, "Created category");
    Ok(())
}

fn update(
    ctx: &Context,
    reference: &str,
    name: Option<String>,
    description: Option<Option<String>>,
    parent: Option<String>,
    root: bool,
) -> Result<()> {
    let project = ctx.project()?;
    let actor = ctx.actor(&project)?;

    let category = project.catalog().transact(|catalog| {
        let mut manager = CategoryManager::new(catalog);
        let current = resolve(&manager, reference)?;

        // Flags left out keep their current value
        let parent_id = match (root, parent.as_deref()) {
            (true, _) => None,
            (false, Some(parent)) => Some(resolve(&manager, parent)?.id),
            (false, None) => current.parent_id.clone(),
        };
        let draft = CategoryDraft {
            name: name.unwrap_or_else(|| current.name.clone()),
            description: description.unwrap_or_else(|| current.description.clone()),
            parent_id,
        };
        manager.update(&current.id, draft, &actor)
    })?;

    report(&ctx.output, &category, "Updated category");
    Ok(())
}

fn move_category(ctx: &Context, reference: &str, parent: Option<String>) -> Result<()> {
    let project = ctx.project()?;
    let actor = ctx.actor(&project)?;

    let category = project.catalog().transact(|catalog| {
        let mut manager = CategoryManager::new(catalog);
        let id = resolve(&manager, reference)?.id;
        let parent = match parent.as_deref() {
            Some(parent) => Some(resolve(&manager, parent)?.id),
            None => None,
        };
        manager.move_to(&id, parent.as_ref(), &actor)
    })?;

    report(&ctx.output, &category, "Moved category");
    Ok(())
}

fn delete(ctx: &Context, reference: &str) -> Result<()> {
    let project = ctx.project()?;

    let category = project.catalog().transact(|catalog| {
        let mut manager = CategoryManager::new(catalog);
        let id = resolve(&manager, reference)?.id;
        manager.delete(&id)
    })?;

    report(&ctx.output, &category, "Deleted category");
    Ok(())
}

fn show(ctx: &Context, reference: &str) -> Result<()> {
    let project = ctx.project()?;

    let (category, path, children, ads, subtree_ads) = project.catalog().read(|catalog| {
        let manager = CategoryManager::new(catalog);
        let category = resolve(&manager, reference)?;
        let path = manager.path(&category.id)?;
        let children = manager.children_of(Some(&category.id))?;
        let ads = manager.ad_count(&category.id)?;
        let subtree_ads = manager.subtree_ad_count(&category.id)?;
        Ok((category, path, children, ads, subtree_ads))
    })?;

    if ctx.output.is_json() {
        ctx.output.data(&serde_json::json!({
            "category": category,
            "path": path.iter().map(|c| &c.name).collect::<Vec<_>>(),
            "children": children,
            "ads": ads,
            "subtree_ads": subtree_ads,
        }));
        return Ok(());
    }

    println!("ID:          {}", category.id);
    println!("Name:        {}", category.name);
    if let Some(description) = &category.description {
        println!("Description: {}", description);
    }
    println!("Path:        {}", render_path(&path));
    println!(
        "Created:     {} by {}",
        category.created_at.format("%Y-%m-%d %H:%M"),
        category.created_by
    );
    if let Some(by) = &category.updated_by {
        println!(
            "Updated:     {} by {}",
            category.updated_at.format("%Y-%m-%d %H:%M"),
            by
        );
    }
    println!("Ads:         {} ({} including subcategories)", ads, subtree_ads);

    if !children.is_empty() {
        println!();
        println!("Subcategories:");
        for child in &children {
            println!("  {}  {}", child.id, child.name);
        }
    }
    Ok(())
}

fn list(ctx: &Context, parent: Option<&str>) -> Result<()> {
    let project = ctx.project()?;

    let categories = project.catalog().read(|catalog| {
        let manager = CategoryManager::new(catalog);
        let parent = match parent {
            Some(parent) => Some(resolve(&manager, parent)?.id),
            None => None,
        };
        manager.children_of(parent.as_ref())
    })?;

    print_categories(&ctx.output, &categories, "No categories found");
    Ok(())
}

fn tree(ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let forest = project
        .catalog()
        .read(|catalog| CategoryManager::new(catalog).tree())?;

    if ctx.output.is_json() {
        ctx.output.data(&forest);
        return Ok(());
    }

    if forest.is_empty() {
        println!("No categories found");
        return Ok(());
    }
    for node in &forest {
        print_node(node, 0);
    }
    Ok(())
}

fn print_node(node: &CategoryNode, indent: usize) {
    println!(
        "{}{} ({}) [{} ads]",
        "  ".repeat(indent),
        node.category.name,
        node.category.id,
        node.ads_count
    );
    for child in &node.children {
        print_node(child, indent + 1);
    }
}

/// Served from the SQLite index, which walks the chain in one query
fn path(ctx: &Context, reference: &str) -> Result<()> {
    let project = ctx.project()?;
    let mut cache = project.get_or_rebuild_cache()?;

    let manager = CategoryManager::new(&mut cache);
    let category = resolve(&manager, reference)?;
    let path = manager.path(&category.id)?;

    if ctx.output.is_json() {
        ctx.output.data(&path);
    } else {
        println!("{}", render_path(&path));
    }
    Ok(())
}

fn count(ctx: &Context, reference: &str, recursive: bool) -> Result<()> {
    let project = ctx.project()?;
    let mut cache = project.get_or_rebuild_cache()?;

    let manager = CategoryManager::new(&mut cache);
    let category = resolve(&manager, reference)?;
    let count = if recursive {
        manager.subtree_ad_count(&category.id)?
    } else {
        manager.ad_count(&category.id)?
    };

    if ctx.output.is_json() {
        ctx.output.data(&serde_json::json!({
            "id": category.id,
            "name": category.name,
            "recursive": recursive,
            "ads": count,
        }));
    } else {
        println!("{}", count);
    }
    Ok(())
}

fn select(ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let entries = project
        .catalog()
        .read(|catalog| CategoryManager::new(catalog).select_list())?;

    if ctx.output.is_json() {
        ctx.output.data(&entries);
        return Ok(());
    }

    for entry in &entries {
        let marker = if entry.has_children { "+" } else { " " };
        println!("{} {}  {}", marker, entry.id, entry.name);
    }
    Ok(())
}

fn search(ctx: &Context, term: &str) -> Result<()> {
    let project = ctx.project()?;
    let categories = project
        .catalog()
        .read(|catalog| CategoryManager::new(catalog).search(term))?;

    print_categories(&ctx.output, &categories, &format!("No categories match '{}'", term));
    Ok(())
}

fn popular(ctx: &Context, limit: usize) -> Result<()> {
    let project = ctx.project()?;
    let ranked = project
        .catalog()
        .read(|catalog| CategoryManager::new(catalog).most_used(limit))?;

    if ctx.output.is_json() {
        let rows: Vec<_> = ranked
            .iter()
            .map(|(c, n)| serde_json::json!({ "category": c, "ads": n }))
            .collect();
        ctx.output.data(&rows);
        return Ok(());
    }

    if ranked.is_empty() {
        println!("No category has ads yet");
    }
    for (category, ads) in &ranked {
        println!("{:>5}  {}  {}", ads, category.id, category.name);
    }
    Ok(())
}

fn unused(ctx: &Context) -> Result<()> {
    let project = ctx.project()?;
    let categories = project
        .catalog()
        .read(|catalog| CategoryManager::new(catalog).unused())?;

    print_categories(&ctx.output, &categories, "Every category has ads");
    Ok(())
}

fn report(output: &Output, category: &Category, verb: &str) {
    if output.is_json() {
        output.data(category);
    } else {
        output.success(&format!("{} {}: {}", verb, category.id, category.name));
    }
}

fn print_categories(output: &Output, categories: &[Category], empty: &str) {
    if output.is_json() {
        output.data(&categories);
        return;
    }

    if categories.is_empty() {
        println!("{}", empty);
    }
    for category in categories {
        println!("{}  {}", category.id, category.name);
    }
}

fn render_path(path: &[Category]) -> String {
    path.iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}
