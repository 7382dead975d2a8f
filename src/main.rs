use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use burnin::assemble::assemble;
use burnin::manifest::load_and_validate_manifest;
use burnin::progress::RenderControl;
use burnin::render::{apply_effects, burn_captions};
use burnin::schema::{CaptionAnchor, CaptionStyle};
use burnin::tokens::load_tokens;

fn build_version() -> &'static str {
    match option_env!("BURNIN_GIT_HASH") {
        Some(hash) => {
            Box::leak(format!("{} ({hash})", env!("CARGO_PKG_VERSION")).into_boxed_str())
        }
        None => env!("CARGO_PKG_VERSION"),
    }
}

#[derive(Debug, Parser)]
#[command(name = "burnin")]
#[command(about = "Word-synced caption burner and transcript-driven video assembler")]
#[command(version = build_version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnchorArg {
    Center,
    Bottom,
}

impl From<AnchorArg> for CaptionAnchor {
    fn from(value: AnchorArg) -> Self {
        match value {
            AnchorArg::Center => CaptionAnchor::CenterBand,
            AnchorArg::Bottom => CaptionAnchor::BottomBand,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Burn word-synced captions onto a video.
    Caption {
        video: PathBuf,
        #[arg(long)]
        tokens: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = AnchorArg::Center)]
        anchor: AnchorArg,
        #[arg(long)]
        fonts: Option<PathBuf>,
    },
    /// Apply the alternating push-in/push-out zoom.
    Effect {
        video: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Stitch clips into one timeline cut by spoken segment names.
    Assemble {
        manifest: PathBuf,
        #[arg(long)]
        tokens: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long)]
        fonts: Option<PathBuf>,
    },
    /// Validate an assembly manifest.
    Check {
        manifest: PathBuf,
    },
    /// Validate a token file and print its timing table.
    Tokens {
        tokens: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Caption {
            video,
            tokens,
            output,
            anchor,
            fonts,
        } => run_caption(&video, &tokens, &output, anchor.into(), fonts.as_deref()),
        Commands::Effect { video, output } => run_effect(&video, &output),
        Commands::Assemble {
            manifest,
            tokens,
            output,
            fonts,
        } => run_assemble(&manifest, &tokens, &output, fonts.as_deref()),
        Commands::Check { manifest } => run_check(&manifest),
        Commands::Tokens { tokens } => run_tokens(&tokens),
    }
}

fn run_caption(
    video: &Path,
    tokens_path: &Path,
    output: &Path,
    anchor: CaptionAnchor,
    fonts: Option<&Path>,
) -> Result<()> {
    let tokens = load_tokens(tokens_path)?;
    eprintln!("{} tokens loaded", tokens.len());

    let mut control = RenderControl::new();
    let info = burn_captions(
        video,
        tokens,
        CaptionStyle::for_anchor(anchor),
        fonts,
        output,
        &mut control,
    )?;
    println!(
        "Wrote {} ({}x{}, {:.3} fps)",
        output.display(),
        info.width,
        info.height,
        info.fps
    );
    Ok(())
}

fn run_effect(video: &Path, output: &Path) -> Result<()> {
    let mut control = RenderControl::new();
    let info = apply_effects(video, output, &mut control)?;
    println!(
        "Wrote {} ({}x{}, {:.3} fps)",
        output.display(),
        info.width,
        info.height,
        info.fps
    );
    Ok(())
}

fn run_assemble(
    manifest_path: &Path,
    tokens_path: &Path,
    output: &Path,
    fonts: Option<&Path>,
) -> Result<()> {
    let manifest = load_and_validate_manifest(manifest_path)?;
    let tokens = load_tokens(tokens_path)?;
    eprintln!("{} tokens loaded", tokens.len());

    let mut control = RenderControl::new();
    let summary = assemble(&manifest, &tokens, fonts, output, &mut control)?;
    println!(
        "Wrote {} ({} segments, {} frames)",
        output.display(),
        summary.segments_rendered,
        summary.frames_emitted
    );
    Ok(())
}

fn run_check(manifest_path: &Path) -> Result<()> {
    let manifest = load_and_validate_manifest(manifest_path)?;

    println!(
        "OK: {} ({} segments, {} fps, audio {})",
        manifest_path.display(),
        manifest.segments.len(),
        manifest.fps,
        manifest.audio.display()
    );
    for segment in &manifest.segments {
        println!("  {} -> {}", segment.name, segment.clip.display());
    }
    if !manifest.aliases.is_empty() {
        println!("Aliases: {}", manifest.aliases.len());
    }
    Ok(())
}

fn run_tokens(tokens_path: &Path) -> Result<()> {
    let tokens = load_tokens(tokens_path)?;

    println!("{:<25} {:>10} {:>10}", "Word", "Start (s)", "End (s)");
    println!("{}", "-".repeat(47));
    for token in &tokens {
        println!(
            "{:<25} {:>10.3} {:>10.3}",
            token.word, token.start, token.end
        );
    }
    println!("{} tokens", tokens.len());
    Ok(())
}
