// ============================================================================
// PrintDesigner CLI — headless document creation, inspection and export
// ============================================================================
//
// Usage examples:
//   printdesigner new --width 600 --height 600 --text "Hello" --image logo.png -o design.json
//   printdesigner inspect design.json
//   printdesigner export design.json --backgrounds front=mock/front.png --output-dir out/
//   printdesigner export "orders/*.json" -b front=front.png -b back=back.png -o out/
//
// Async loads and exports are driven to completion on the current thread.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::document::Document;
use crate::error::Result;
use crate::io::{DirUploader, FsImageLoader, UploadRef, load_document_file};
use crate::layer::Mode;
use crate::ops::mode::ModeBackgrounds;
use crate::session::EditorSession;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PrintDesigner headless tools.
#[derive(Parser, Debug)]
#[command(
    name = "printdesigner",
    version,
    about = "Create, inspect and export print designs without the editor UI"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Print per-file timing information.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render each document per mode and write the PNGs to a directory.
    Export {
        /// Design document(s). Glob patterns accepted (e.g. "orders/*.json").
        #[arg(required = true, num_args = 1..)]
        documents: Vec<String>,

        /// Mockup image per mode, as MODE=PATH. `front` is required.
        #[arg(short, long = "backgrounds", value_name = "MODE=PATH", required = true)]
        backgrounds: Vec<String>,

        /// Export only these modes instead of front (+ back when configured).
        #[arg(short, long = "mode", value_name = "MODE")]
        modes: Vec<String>,

        /// Where the PNGs are written (default: current directory).
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Directory layer image sources are resolved against
        /// (default: each document's own directory).
        #[arg(long, value_name = "DIR")]
        base_dir: Option<PathBuf>,
    },

    /// Print a summary of a document's layers.
    Inspect {
        document: PathBuf,
    },

    /// Create a new document.
    New {
        #[arg(long, default_value_t = 600)]
        width: u32,
        #[arg(long, default_value_t = 600)]
        height: u32,
        /// Mode new layers are tagged with.
        #[arg(short, long, default_value = "front")]
        mode: String,
        /// Text layer(s) to add, bottom to top.
        #[arg(short, long)]
        text: Vec<String>,
        /// Image layer(s) to add, after the text layers.
        #[arg(short, long)]
        image: Vec<String>,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the requested command and return an OS exit code.
pub fn run(args: CliArgs, settings: EditorSettings) -> ExitCode {
    match args.command {
        Command::Export { documents, backgrounds, modes, output_dir, base_dir } => {
            let backgrounds = match parse_backgrounds(&backgrounds) {
                Ok(b) => b,
                Err(msg) => {
                    eprintln!("error: {}", msg);
                    return ExitCode::FAILURE;
                }
            };
            let modes: Vec<Mode> = modes.iter().map(|m| Mode::new(m.as_str())).collect();
            let output_dir = output_dir.unwrap_or_else(|| PathBuf::from("."));
            run_export(&documents, backgrounds, &modes, &output_dir, base_dir.as_deref(), settings, args.verbose)
        }
        Command::Inspect { document } => run_inspect(&document),
        Command::New { width, height, mode, text, image, output } => {
            run_new(width, height, Mode::new(mode), &text, &image, &output, settings)
        }
    }
}

fn run_export(
    patterns: &[String],
    backgrounds: ModeBackgrounds,
    modes: &[Mode],
    output_dir: &Path,
    base_dir: Option<&Path>,
    settings: EditorSettings,
    verbose: bool,
) -> ExitCode {
    let inputs = resolve_inputs(patterns);
    if inputs.is_empty() {
        eprintln!("error: no documents matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let uploader = DirUploader::new(output_dir);
    let mut failures = 0usize;
    let total = inputs.len();

    for path in &inputs {
        let started = Instant::now();
        let base = base_dir
            .map(Path::to_path_buf)
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();

        let result = pollster::block_on(export_document(path, base, &backgrounds, modes, &settings, &uploader));

        match result {
            Ok(refs) => {
                for (mode, reference) in refs {
                    println!("{}  [{}] -> {}", path.display(), mode, reference);
                }
                if verbose {
                    println!("  ({:.2?})", started.elapsed());
                }
            }
            Err(e) => {
                tracing::error!(document = %path.display(), error = %e, "export failed");
                eprintln!("error: {}: {}", path.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        eprintln!("{} of {} document(s) failed.", failures, total);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn export_document(
    path: &Path,
    base: PathBuf,
    backgrounds: &ModeBackgrounds,
    modes: &[Mode],
    settings: &EditorSettings,
    uploader: &DirUploader,
) -> Result<Vec<(Mode, UploadRef)>> {
    let doc = load_document_file(path)?;
    let mut session = EditorSession::new(doc.width, doc.height, settings.clone(), FsImageLoader::new(base))
        .with_backgrounds(backgrounds.clone());
    session.load_document(&doc).await?;
    if modes.is_empty() {
        let set = session.export_all(uploader).await?;
        let mut refs = vec![(Mode::front(), set.front)];
        refs.extend(set.back.map(|b| (Mode::back(), b)));
        Ok(refs)
    } else {
        Ok(session.export_modes(modes, uploader).await?.into_iter().collect())
    }
}

fn run_inspect(path: &Path) -> ExitCode {
    let doc = match load_document_file(path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: could not read '{}': {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    print!("{}", describe(&doc));
    ExitCode::SUCCESS
}

/// Human-readable document summary.
fn describe(doc: &Document) -> String {
    let mut out = format!(
        "{}×{}  mode={}  version={}  objects={}\n",
        doc.width,
        doc.height,
        doc.mode,
        doc.version,
        doc.objects.len()
    );
    if let Some(bg) = &doc.background {
        out.push_str(&format!("background [{}] {}  scale={}×{}\n", bg.mode, bg.src, bg.scale_x, bg.scale_y));
    }
    for (i, o) in doc.objects.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. {:<5} id={} mode={} at=({}, {}) scale=({}, {}) angle={}",
            i, o.layer_type, o.layer_id, o.mode, o.left, o.top, o.scale_x, o.scale_y, o.angle
        ));
        if let Some(text) = &o.text {
            out.push_str(&format!(" text={:?}", text));
        }
        if let Some(src) = &o.src {
            out.push_str(&format!(
                " src={} crop=({}, {}, {}, {})",
                src,
                o.crop_x.unwrap_or(0.0),
                o.crop_y.unwrap_or(0.0),
                o.width.unwrap_or(0.0),
                o.height.unwrap_or(0.0)
            ));
        }
        if let Some(filters) = o.filters.as_ref().filter(|f| !f.is_empty()) {
            let names: Vec<&str> = filters.iter().map(|f| f.kind.as_str()).collect();
            out.push_str(&format!(" filters={}", names.join(",")));
        }
        out.push('\n');
    }
    out
}

fn run_new(
    width: u32,
    height: u32,
    mode: Mode,
    texts: &[String],
    images: &[String],
    output: &Path,
    settings: EditorSettings,
) -> ExitCode {
    let base = std::env::current_dir().unwrap_or_default();
    let mut session = EditorSession::new(width, height, settings, FsImageLoader::new(base));
    session.set_mode(mode);

    for text in texts {
        session.add_text(Some(text));
    }
    for src in images {
        if let Err(e) = pollster::block_on(session.add_image(src)) {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = session.save(output) {
        eprintln!("error: could not write '{}': {}", output.display(), e);
        return ExitCode::FAILURE;
    }
    let images = session.surface.layers.iter().filter(|l| l.is_image()).count();
    println!(
        "{}: {} layer(s) ({} image)",
        output.display(),
        session.surface.layers.len(),
        images
    );
    ExitCode::SUCCESS
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Parse `MODE=PATH` pairs. Relative paths are made absolute against the
/// current directory so they do not depend on each document's base dir.
fn parse_backgrounds(pairs: &[String]) -> std::result::Result<ModeBackgrounds, String> {
    let cwd = std::env::current_dir().unwrap_or_default();
    let mut backgrounds = ModeBackgrounds::new();
    for pair in pairs {
        let (mode, path) = pair
            .split_once('=')
            .ok_or_else(|| format!("background '{}' is not MODE=PATH", pair))?;
        let (mode, path) = (mode.trim(), path.trim());
        if mode.is_empty() || path.is_empty() {
            return Err(format!("background '{}' is not MODE=PATH", pair));
        }
        let path = Path::new(path);
        let path = if path.is_absolute() { path.to_path_buf() } else { cwd.join(path) };
        backgrounds.insert(Mode::new(mode), path.to_string_lossy().into_owned());
    }
    if !backgrounds.contains(&Mode::front()) {
        return Err("a 'front' background is required".to_string());
    }
    Ok(backgrounds)
}

/// Expand glob patterns / literal paths into a de-duplicated list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut documents = Vec::new();
    for pattern in patterns {
        match expand_pattern(pattern) {
            Ok(paths) if paths.is_empty() => eprintln!("warning: '{}' matched no documents.", pattern),
            Ok(paths) => documents.extend(paths.into_iter().filter(|p| seen.insert(p.clone()))),
            Err(msg) => eprintln!("warning: {}", msg),
        }
    }
    documents
}

/// Files named by `pattern`: the path itself when it is a file, otherwise
/// its glob matches in the order `glob` yields them. Directories are skipped.
fn expand_pattern(pattern: &str) -> std::result::Result<Vec<PathBuf>, String> {
    let literal = Path::new(pattern);
    if literal.is_file() {
        return Ok(vec![literal.to_path_buf()]);
    }
    let entries = glob::glob(pattern).map_err(|e| format!("invalid glob '{}': {}", pattern, e))?;
    Ok(entries.flatten().filter(|p| p.is_file()).collect())
}
