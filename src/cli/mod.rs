//! HC-013: CLI subcommands — compile, validate, types, match.

use crate::core::collection::TypeCollection;
use crate::core::compiler::{Compiler, NodeInfo};
use crate::core::descriptor::TypeDocument;
use crate::core::settings::{self, Settings};
use crate::core::types::{value_from_yaml, TypeKind};
use crate::core::{parser, store};
use clap::{Subcommand, ValueEnum};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile the catalog for one node
    Compile {
        /// Node (host) name
        #[arg(short, long)]
        node: String,

        /// Manifest directory (default: manifest_dir from settings)
        #[arg(short, long)]
        manifests: Option<PathBuf>,

        /// YAML file of facts to expose as top-scope variables
        #[arg(long)]
        facts: Option<PathBuf>,

        /// Extra class to include (repeatable)
        #[arg(short, long = "class")]
        classes: Vec<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,

        /// Write <out>/<node>/catalog.yaml instead of printing
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Settings file
        #[arg(long, default_value = "hostcat.toml")]
        config: PathBuf,
    },

    /// Validate manifests without compiling
    Validate {
        /// Manifest directory (default: manifest_dir from settings)
        #[arg(short, long)]
        manifests: Option<PathBuf>,

        /// Settings file
        #[arg(long, default_value = "hostcat.toml")]
        config: PathBuf,
    },

    /// List known classes, defines and nodes
    Types {
        /// Manifest directory (default: manifest_dir from settings)
        #[arg(short, long)]
        manifests: Option<PathBuf>,

        /// Only list one kind (class, define, node)
        #[arg(short, long)]
        kind: Option<TypeKind>,

        /// Print full type documents instead of one line per type
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Settings file
        #[arg(long, default_value = "hostcat.toml")]
        config: PathBuf,
    },

    /// Show which node definition a hostname selects
    Match {
        /// Hostname to match
        hostname: String,

        /// Manifest directory (default: manifest_dir from settings)
        #[arg(short, long)]
        manifests: Option<PathBuf>,

        /// Settings file
        #[arg(long, default_value = "hostcat.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Compile {
            node,
            manifests,
            facts,
            classes,
            format,
            out,
            config,
        } => cmd_compile(
            &config,
            manifests.as_deref(),
            &node,
            facts.as_deref(),
            &classes,
            format,
            out.as_deref(),
        ),
        Commands::Validate { manifests, config } => cmd_validate(&config, manifests.as_deref()),
        Commands::Types {
            manifests,
            kind,
            format,
            config,
        } => cmd_types(&config, manifests.as_deref(), kind, format),
        Commands::Match {
            hostname,
            manifests,
            config,
        } => cmd_match(&config, manifests.as_deref(), &hostname),
    }
}

/// Load settings and every manifest, failing on validation errors.
fn load(config: &Path, manifests: Option<&Path>) -> Result<(Settings, Vec<parser::Manifest>), String> {
    let settings = settings::load_settings(config).map_err(|e| e.to_string())?;
    let dir = manifests.unwrap_or(settings.manifest_dir.as_path()).to_path_buf();
    let loaded = parser::load_manifest_dir(&dir).map_err(|e| e.to_string())?;

    let mut failures = 0;
    for manifest in &loaded {
        for e in parser::validate_manifest(manifest) {
            let file = manifest
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            eprintln!("  ERROR: {}: {}", file, e);
            failures += 1;
        }
    }
    if failures > 0 {
        return Err(format!("{} validation error(s)", failures));
    }
    Ok((settings, loaded))
}

fn load_collection(config: &Path, manifests: Option<&Path>) -> Result<(Settings, TypeCollection), String> {
    let (settings, loaded) = load(config, manifests)?;
    let types = parser::build_collection(&loaded, &settings).map_err(|e| e.to_string())?;
    Ok((settings, types))
}

fn load_facts(path: &Path) -> Result<IndexMap<String, serde_yaml_ng::Value>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_yaml_ng::from_str(&content).map_err(|e| format!("invalid facts file {}: {}", path.display(), e))
}

fn cmd_compile(
    config: &Path,
    manifests: Option<&Path>,
    node: &str,
    facts: Option<&Path>,
    classes: &[String],
    format: OutputFormat,
    out: Option<&Path>,
) -> Result<(), String> {
    let (settings, types) = load_collection(config, manifests)?;

    let mut info = NodeInfo::new(node);
    if let Some(path) = facts {
        for (name, value) in load_facts(path)? {
            info = info.with_fact(&name, value_from_yaml(&value));
        }
    }
    for class in classes {
        info = info.with_class(class);
    }

    let catalog = Compiler::new(types, info, settings)
        .compile()
        .map_err(|e| e.to_string())?;
    let doc = catalog.to_document();

    if let Some(dir) = out {
        let path = store::save_catalog(dir, &doc).map_err(|e| e.to_string())?;
        println!(
            "Compiled {} ({} resources, {} classes) → {}",
            doc.name,
            doc.resources.len(),
            doc.classes.len(),
            path.display()
        );
        return Ok(());
    }

    let rendered = match format {
        OutputFormat::Yaml => serde_yaml_ng::to_string(&doc).map_err(|e| format!("serialize error: {}", e))?,
        OutputFormat::Json => serde_json::to_string_pretty(&doc).map_err(|e| format!("serialize error: {}", e))?,
    };
    println!("{}", rendered);
    Ok(())
}

fn cmd_validate(config: &Path, manifests: Option<&Path>) -> Result<(), String> {
    let (settings, loaded) = load(config, manifests)?;
    let files = loaded.len();
    let types = parser::build_collection(&loaded, &settings).map_err(|e| e.to_string())?;
    println!(
        "OK: {} manifest(s), {} classes, {} defines, {} nodes",
        files,
        types.ids_of(TypeKind::Hostclass).count(),
        types.ids_of(TypeKind::Definition).count(),
        types.ids_of(TypeKind::Node).count()
    );
    Ok(())
}

fn cmd_types(
    config: &Path,
    manifests: Option<&Path>,
    kind: Option<TypeKind>,
    format: Option<OutputFormat>,
) -> Result<(), String> {
    let (_, types) = load_collection(config, manifests)?;
    let docs = type_documents(&types, kind);
    match format {
        None => {
            for line in type_listing(&types, kind) {
                println!("{}", line);
            }
        }
        Some(OutputFormat::Yaml) => {
            let rendered = serde_yaml_ng::to_string(&docs).map_err(|e| format!("serialize error: {}", e))?;
            println!("{}", rendered);
        }
        Some(OutputFormat::Json) => {
            let rendered = serde_json::to_string_pretty(&docs).map_err(|e| format!("serialize error: {}", e))?;
            println!("{}", rendered);
        }
    }
    Ok(())
}

fn type_documents(types: &TypeCollection, kind: Option<TypeKind>) -> Vec<TypeDocument> {
    types
        .iter()
        .filter(|(_, t)| kind.is_none_or(|k| t.kind() == k))
        .map(|(_, t)| t.to_document())
        .collect()
}

fn type_listing(types: &TypeCollection, kind: Option<TypeKind>) -> Vec<String> {
    types
        .iter()
        .filter(|(_, t)| kind.is_none_or(|k| t.kind() == k))
        .map(|(_, t)| {
            let name = if t.name().is_empty() && t.is_hostclass() {
                "<main>".to_string()
            } else {
                t.key()
            };
            let mut line = format!("{:<7} {}", t.kind().to_string(), name);
            if let Some(parent) = &t.parent {
                line.push_str(&format!(" inherits {}", parent));
            }
            if let Some(module) = &t.module_name {
                line.push_str(&format!(" [{}]", module));
            }
            line
        })
        .collect()
}

fn cmd_match(config: &Path, manifests: Option<&Path>, hostname: &str) -> Result<(), String> {
    let (_, types) = load_collection(config, manifests)?;
    let info = NodeInfo::new(hostname);
    match types.node_for(&info.names()) {
        Some(id) => {
            println!("{} → node {}", info.name, types.get(id).key());
            Ok(())
        }
        None => Err(format!("no node definition matches '{}'", info.name)),
    }
}
