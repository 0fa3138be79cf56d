//! `trellis links check`, `trellis gardens` and `trellis tree`.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::index_cmd::open_indexes;
use crate::render;
use crate::store::{path_to_string, DocumentStore, TreeNode};

/// Resolve every document's links against the content index and report the
/// targets that match nothing.
pub async fn run_links_check(config: &Config) -> Result<()> {
    let indexes = open_indexes(config).await?;
    let manager = &indexes.manager;
    let store = manager.store();

    let mut documents = store.root_documents()?;
    for garden in store.gardens()? {
        documents.extend(
            store
                .list(&garden.slug, true)?
                .into_iter()
                .filter_map(|e| e.document().cloned()),
        );
    }

    let mut broken = 0;
    for doc in &documents {
        let rendered = render::render_page(
            store,
            manager.content_index(),
            manager.renderer(),
            &doc.path,
        )
        .await
        .with_context(|| format!("Failed to render {}", doc.path.display()))?;

        if rendered.unresolved.is_empty() {
            continue;
        }
        println!("{}", path_to_string(&doc.path));
        for target in &rendered.unresolved {
            println!("  [[{}]]", target);
        }
        broken += rendered.unresolved.len();
    }

    println!();
    println!(
        "Checked {} documents: {} unresolved link{}",
        documents.len(),
        broken,
        if broken == 1 { "" } else { "s" }
    );

    indexes.close().await;
    Ok(())
}

/// List gardens in display order, creating missing configs.
pub fn run_gardens(config: &Config) -> Result<()> {
    let store = DocumentStore::with_excludes(&config.content_dir, &config.exclude_globs)
        .context("Invalid paths.exclude_globs")?;
    let gardens = store.gardens()?;
    if gardens.is_empty() {
        println!("No gardens.");
        return Ok(());
    }

    println!("  {:<24} {:>6}   {}", "SLUG", "ORDER", "TITLE");
    println!("  {}", "-".repeat(60));
    for garden in &gardens {
        println!(
            "  {:<24} {:>6}   {}",
            garden.slug, garden.config.order, garden.config.title
        );
    }
    Ok(())
}

/// Print a garden's directory tree, indented by depth.
pub fn run_tree(config: &Config, garden: &str, depth: Option<usize>) -> Result<()> {
    let store = DocumentStore::with_excludes(&config.content_dir, &config.exclude_globs)
        .context("Invalid paths.exclude_globs")?;
    match store.hierarchy(garden, depth)? {
        Some(tree) => print_node(&tree, 0),
        None => println!("No garden named '{}'.", garden),
    }
    Ok(())
}

fn print_node(node: &TreeNode, indent: usize) {
    let is_garden = !node.is_bundle && !node.name.ends_with(".md");
    let suffix = if is_garden { "/" } else { "" };
    println!("{}{}{}", "  ".repeat(indent), node.name, suffix);
    for child in &node.children {
        print_node(child, indent + 1);
    }
}
