use anyhow::{Context, Result};
use devdesk_config::load_from_path;
use devdesk_types::ServiceDescriptor;

use crate::commands::resolve_file;

pub fn check(file: Option<String>) -> Result<()> {
    let path = resolve_file(file);
    let config = load_from_path(&path)
        .with_context(|| format!("invalid configuration `{}`", path.display()))?;

    println!(
        "{}: {} services, start order:",
        path.display(),
        config.store.len()
    );
    for (position, name) in config.store.order().iter().enumerate() {
        if let Some(descriptor) = config.store.get(name) {
            println!("{:>3}. {}", position + 1, describe(descriptor));
        }
    }

    Ok(())
}

fn describe(descriptor: &ServiceDescriptor) -> String {
    let deps = if descriptor.deps.is_empty() {
        String::from("-")
    } else {
        descriptor.deps.join(", ")
    };
    format!(
        "{} (after: {deps}; ready when {}; up to {} restarts)",
        descriptor.name, descriptor.probe, descriptor.restart.max_restarts
    )
}
