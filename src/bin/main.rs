use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use timeout_weaver::classfile::ClassReader;
use timeout_weaver::engine::registry;
use timeout_weaver::{transformer_for_directory, TimeoutDefaults};

#[derive(Parser)]
#[command(name = "timeout-weaver")]
#[command(about = "Patches default socket timeouts into the JDK http connection classes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch the registered classes inside an exploded class directory
    Patch {
        /// Directory holding .class files laid out by package
        #[arg(value_name = "DIR")]
        classes: PathBuf,

        /// Default connect timeout in milliseconds
        #[arg(long, value_name = "MILLIS", default_value_t = 5000)]
        connect_timeout_millis: u64,

        /// Default read timeout in milliseconds
        #[arg(long, value_name = "MILLIS", default_value_t = 10000)]
        read_timeout_millis: u64,

        /// Write patched classes here instead of in place
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the structure of a single .class file
    Inspect {
        /// Input .class file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Patch { classes, connect_timeout_millis, read_timeout_millis, output, verbose } => {
            patch_directory(
                classes,
                *connect_timeout_millis,
                *read_timeout_millis,
                output.as_ref(),
                *verbose,
            )?;
        }
        Commands::Inspect { input } => {
            inspect_file(input)?;
        }
    }

    Ok(())
}

fn patch_directory(
    classes: &PathBuf,
    connect_timeout_millis: u64,
    read_timeout_millis: u64,
    output: Option<&PathBuf>,
    verbose: bool,
) -> Result<()> {
    let defaults = TimeoutDefaults::new(connect_timeout_millis, read_timeout_millis)?;
    let transformer = transformer_for_directory(classes, defaults);

    let mut patched = 0usize;
    let mut unchanged = 0usize;
    for entry in WalkDir::new(classes) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(classes)?;
        let Some(internal_name) = internal_name_for(relative) else {
            continue;
        };
        if !registry::is_target(&internal_name) {
            unchanged += 1;
            if verbose {
                println!("unchanged {}", internal_name);
            }
            continue;
        }

        let bytes = fs::read(entry.path())
            .with_context(|| format!("reading {}", entry.path().display()))?;
        let transformed = transformer.transform(&internal_name, &bytes)?;

        let destination = match output {
            Some(out_root) => {
                let path = out_root.join(relative);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                path
            }
            None => entry.path().to_path_buf(),
        };
        fs::write(&destination, transformed)
            .with_context(|| format!("writing {}", destination.display()))?;
        patched += 1;
        if verbose {
            println!("patched {} -> {}", internal_name, destination.display());
        }
    }

    println!("{} patched, {} unchanged", patched, unchanged);
    Ok(())
}

fn inspect_file(input: &PathBuf) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let class_file = ClassReader::new(&bytes).parse()?;

    println!("class      {}", class_file.class_name().unwrap_or("<unnamed>"));
    println!("super      {}", class_file.super_class_name().unwrap_or("<none>"));
    println!("version    {}.{}", class_file.major_version, class_file.minor_version);
    println!("constants  {}", class_file.constant_pool.len());
    println!("methods    {}", class_file.methods.len());
    for method in &class_file.methods {
        let name = method.name(&class_file.constant_pool).unwrap_or("<bad name>");
        let descriptor = method.descriptor(&class_file.constant_pool).unwrap_or("");
        let marker = if name == registry::TARGET_METHOD { "  [connect]" } else { "" };
        println!("  {}{}{}", name, descriptor, marker);
    }
    if class_file.declared_method(registry::TARGET_METHOD).is_none() {
        println!("note: {} is not declared here", registry::TARGET_METHOD);
    }
    Ok(())
}

/// Maps a path relative to the class root onto an internal class name.
/// Returns `None` for anything that is not a `.class` file.
fn internal_name_for(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        parts.push(component.as_os_str().to_str()?);
    }
    parts.join("/").strip_suffix(".class").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_class_path_maps_to_internal_name() {
        let path = Path::new("sun/net/www/protocol/http/HttpURLConnection.class");
        assert_eq!(
            internal_name_for(path),
            Some("sun/net/www/protocol/http/HttpURLConnection".to_string())
        );
    }

    #[test]
    fn non_class_files_are_ignored() {
        assert_eq!(internal_name_for(Path::new("META-INF/MANIFEST.MF")), None);
        assert_eq!(internal_name_for(Path::new("readme.txt")), None);
    }
}
