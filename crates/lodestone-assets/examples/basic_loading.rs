//! Loads a small scene graph out of in-memory files and prints progress.
//!
//! Run with `cargo run -p lodestone-assets --example basic_loading`.

use std::sync::Arc;

use lodestone_assets::{
    Asset, AssetDescriptor, AssetManager, AssetResult, LoadContext, Loader, LoaderParams,
    MemoryResolver, ResolvedFile, ResourcePayload, SyncAssetLoader,
};

struct Text {
    content: String,
}

impl Asset for Text {}

/// Loads UTF-8 files; lines of the form `uses <name>` declare dependencies.
struct TextLoader;

impl SyncAssetLoader for TextLoader {
    fn dependencies(
        &self,
        _name: &str,
        file: &ResolvedFile,
        _params: Option<&Arc<LoaderParams>>,
    ) -> Option<Vec<AssetDescriptor>> {
        let content = String::from_utf8(file.read_bytes().ok()?).ok()?;
        let deps: Vec<AssetDescriptor> = content
            .lines()
            .filter_map(|line| line.strip_prefix("uses "))
            .map(|dep| AssetDescriptor::new::<Text>(dep))
            .collect();
        if deps.is_empty() { None } else { Some(deps) }
    }

    fn load(&self, ctx: &LoadContext<'_>) -> AssetResult<ResourcePayload> {
        let content = String::from_utf8_lossy(&ctx.file().read_bytes()?).into_owned();
        Ok(ResourcePayload::new(Text { content }))
    }
}

fn main() -> AssetResult<()> {
    lodestone_core::logging::init();

    let resolver = Arc::new(MemoryResolver::new());
    resolver.insert(
        "levels/forest.txt",
        b"uses tiles/grass.txt\nuses tiles/tree.txt\nA quiet forest.".to_vec(),
    );
    resolver.insert("tiles/grass.txt", b"uses palette.txt\ngreen".to_vec());
    resolver.insert("tiles/tree.txt", b"uses palette.txt\nbrown".to_vec());
    resolver.insert("palette.txt", b"#3a5f0b #8b5a2b".to_vec());

    let manager = AssetManager::with_resolver(resolver);
    manager.register_loader::<Text>("", Loader::sync(TextLoader))?;

    manager.load::<Text>("levels/forest.txt")?;
    while !manager.update()? {
        println!("loading... {:.0}%", manager.progress() * 100.0);
    }

    let level = manager.get_required::<Text>("levels/forest.txt")?;
    println!("loaded: {}", level.content.lines().last().unwrap_or(""));
    println!(
        "dependencies: {:?}",
        manager.dependencies_of("levels/forest.txt").unwrap_or_default()
    );
    println!(
        "palette refs: {}",
        manager.ref_count("palette.txt")?
    );

    manager.unload("levels/forest.txt")?;
    println!("after unload, palette loaded: {}", manager.contains("palette.txt"));
    Ok(())
}
