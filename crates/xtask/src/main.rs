use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("arch-check") => arch_check(),
        Some(cmd) => anyhow::bail!("Unknown xtask command: {cmd}"),
        None => anyhow::bail!("Usage: cargo xtask <command>\n\nCommands:\n  arch-check"),
    }
}

#[derive(Debug, Deserialize)]
struct Metadata {
    packages: Vec<Package>,
    workspace_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Package {
    name: String,
    dependencies: Vec<Dependency>,
}

#[derive(Debug, Deserialize)]
struct Dependency {
    name: String,
    kind: Option<String>,
}

/// Crates each workspace member must not depend on (normal dependencies only).
const FORBIDDEN_DEPS: &[(&str, &[&str])] = &[
    (
        "hexworld-domain",
        &["tokio", "sqlx", "rand", "async-trait", "tracing", "hexworld-shared", "hexworld-engine"],
    ),
    ("hexworld-shared", &["tokio", "sqlx", "hexworld-domain", "hexworld-engine"]),
];

/// Paths the pure domain crate must not reach for.
const FORBIDDEN_IMPORTS: &str = r"\b(tokio|sqlx|rand|std::fs|std::net|std::thread)::";

fn arch_check() -> anyhow::Result<()> {
    let output = std::process::Command::new("cargo")
        .args(["metadata", "--format-version", "1", "--no-deps"])
        .output()
        .context("running cargo metadata")?;

    if !output.status.success() {
        anyhow::bail!("cargo metadata failed")
    }

    let metadata: Metadata =
        serde_json::from_slice(&output.stdout).context("parsing cargo metadata")?;

    let mut violations = Vec::new();
    for (crate_name, forbidden) in FORBIDDEN_DEPS {
        let package = metadata
            .packages
            .iter()
            .find(|p| p.name == *crate_name)
            .with_context(|| format!("package {crate_name} not in workspace"))?;
        let deps: BTreeSet<&str> = package
            .dependencies
            .iter()
            .filter(|d| d.kind.is_none())
            .map(|d| d.name.as_str())
            .collect();
        for name in forbidden.iter().filter(|name| deps.contains(*name)) {
            violations.push(format!("{crate_name} depends on {name}"));
        }
    }

    let pattern = regex_lite::Regex::new(FORBIDDEN_IMPORTS).context("compiling import pattern")?;
    let domain_src = metadata.workspace_root.join("crates/domain/src");
    for file in rust_files(&domain_src)? {
        let source = std::fs::read_to_string(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        for (line_no, line) in source.lines().enumerate() {
            if let Some(m) = pattern.find(line) {
                violations.push(format!(
                    "{}:{}: domain code uses {}",
                    file.display(),
                    line_no + 1,
                    m.as_str().trim_end_matches("::")
                ));
            }
        }
    }

    if violations.is_empty() {
        println!("arch-check: ok");
        return Ok(());
    }
    for violation in &violations {
        eprintln!("  {violation}");
    }
    anyhow::bail!("arch-check: {} violation(s)", violations.len())
}

fn rust_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
