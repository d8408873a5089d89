use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use thumbtoken::config::Settings;
use thumbtoken::enhance::Watermark;
use thumbtoken::optimize::{self, ExternalOptimizer};
use thumbtoken::{CropRect, OutputFormat, Quality, RenderOptions, Renderer, ResizeOp, Token};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup — trivial, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

/// Key material shared by every command that touches tokens.
#[derive(clap::Args, Clone)]
struct KeyArgs {
    /// Secret key (UTF-8 string)
    #[arg(long, conflicts_with = "key_file")]
    key: Option<String>,

    /// Read the secret key from this file (trailing whitespace trimmed)
    #[arg(long)]
    key_file: Option<PathBuf>,
}

impl KeyArgs {
    fn resolve(&self, settings: &Settings) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let merged = Settings {
            key: self.key.clone().or_else(|| settings.key.clone()),
            key_file: self.key_file.clone().or_else(|| settings.key_file.clone()),
            ..settings.clone()
        };
        Ok(merged.secret_key()?)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OpKind {
    Org,
    FitWidth,
    FitAll,
    MaxBox,
    Force,
    Manual,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Keep,
    Jpeg,
    JpegProgressive,
    Png,
    Gif,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Keep => OutputFormat::Keep,
            FormatArg::Jpeg => OutputFormat::Jpeg,
            FormatArg::JpegProgressive => OutputFormat::JpegProgressive,
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Gif => OutputFormat::Gif,
        }
    }
}

/// The transform an `encode` invocation describes.
#[derive(clap::Args, Clone)]
struct TransformArgs {
    /// Resize/crop operation
    #[arg(long, value_enum, default_value = "org")]
    op: OpKind,

    /// Target width (0 = unconstrained)
    #[arg(long, default_value_t = 0)]
    width: u16,

    /// Target height (0 = unconstrained)
    #[arg(long, default_value_t = 0)]
    height: u16,

    /// Manual crop rectangle as left,top,width,height
    #[arg(long)]
    crop: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "keep")]
    format: FormatArg,

    /// Encoding quality (1-100)
    #[arg(long)]
    quality: Option<u8>,

    /// Skip post-render optimization
    #[arg(long)]
    no_optimize: bool,

    /// Mark the derivative as a temporary preview
    #[arg(long)]
    preview: bool,

    /// Saturation adjustment (-100..=100)
    #[arg(long, default_value_t = 0)]
    color: i8,

    /// Contrast adjustment (-100..=100)
    #[arg(long, default_value_t = 0)]
    contrast: i8,

    /// Brightness adjustment (-100..=100)
    #[arg(long, default_value_t = 0)]
    brightness: i8,
}

impl TransformArgs {
    fn parse_crop(&self) -> Result<Option<CropRect>, String> {
        let Some(text) = &self.crop else {
            return Ok(None);
        };
        let parts: Vec<u16> = text
            .split(',')
            .map(|p| p.trim().parse::<u16>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("bad --crop value {text:?}: {e}"))?;
        if parts.len() != 4 {
            return Err(format!(
                "--crop needs four values (left,top,width,height), got {}",
                parts.len()
            ));
        }
        Ok(CropRect {
            left: parts[0],
            top: parts[1],
            width: parts[2],
            height: parts[3],
        }
        .normalize())
    }

    fn to_token(&self, default_quality: u8) -> Result<Token, String> {
        let op = match self.op {
            OpKind::Org => ResizeOp::Original,
            OpKind::FitWidth => ResizeOp::FitWidth {
                width: self.width,
                height: self.height,
            },
            OpKind::FitAll => ResizeOp::FitAll {
                width: self.width,
                height: self.height,
            },
            OpKind::MaxBox => ResizeOp::MaxBox {
                width: self.width,
                height: self.height,
            },
            OpKind::Force => ResizeOp::Force {
                width: self.width,
                height: self.height,
            },
            OpKind::Manual => ResizeOp::Manual {
                width: self.width,
                height: self.height,
                crop: self.parse_crop()?,
            },
        };
        let mut token = Token::new(op);
        token.format = self.format.into();
        token.quality = Quality::new(self.quality.unwrap_or(default_quality));
        token.optimize = !self.no_optimize;
        token.preview = self.preview;
        token.color = self.color;
        token.contrast = self.contrast;
        token.brightness = self.brightness;
        Ok(token)
    }
}

#[derive(Parser)]
#[command(name = "thumbtoken")]
#[command(about = "Tamper-evident image transform tokens and thumbnail rendering")]
#[command(long_about = "\
Tamper-evident image transform tokens and thumbnail rendering

A token describes one image transformation (resize/crop mode, output format,
quality, color adjustments) and is sealed with a keyed checksum bound to the
image's filename. Encode tokens when building links; decode and render them
when serving.

  thumbtoken encode photos/cat.jpg --op fit-all --width 200 --height 200 --key s3cret
  thumbtoken inspect <token> photos/cat.jpg --key s3cret
  thumbtoken render <token> photos/cat.jpg --source cat.jpg --dest cat_t.jpg --key s3cret

The secret key can also live in a TOML config (--config, default
thumbtoken.toml) as `key` or `key_file`.")]
#[command(version = version_string())]
struct Cli {
    /// Settings file
    #[arg(long, default_value = "thumbtoken.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build and print a transform token for a filename
    Encode {
        /// Logical filename the token is bound to (as it appears in URLs)
        filename: String,

        #[command(flatten)]
        key: KeyArgs,

        #[command(flatten)]
        transform: TransformArgs,
    },
    /// Decode and verify a token, printing its parameters as JSON
    Inspect {
        token: String,

        /// Logical filename the token was bound to
        filename: String,

        #[command(flatten)]
        key: KeyArgs,
    },
    /// Decode a token and render the derivative image
    Render {
        token: String,

        /// Logical filename the token was bound to
        filename: String,

        /// Source image file
        #[arg(long)]
        source: PathBuf,

        /// Destination file (written atomically)
        #[arg(long)]
        dest: PathBuf,

        #[command(flatten)]
        key: KeyArgs,

        /// Copy EXIF/IPTC/ICC metadata when source and output are both JPEG
        #[arg(long)]
        metadata: bool,

        /// Watermark image composited onto the result
        #[arg(long)]
        watermark: Option<PathBuf>,

        /// Background frame image composited underneath the watermark
        #[arg(long, requires = "watermark")]
        watermark_frame: Option<PathBuf>,

        /// Run external optimizers on the written file
        #[arg(long)]
        optimize_after: bool,
    },
    /// Re-compress image files or trees in place with the external tools
    Optimize {
        /// Files or directories
        paths: Vec<PathBuf>,
    },
}

fn load_settings(path: &PathBuf) -> Result<Settings, Box<dyn std::error::Error>> {
    if path.is_file() {
        Ok(Settings::load(path)?)
    } else {
        Ok(Settings::default())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;

    match cli.command {
        Command::Encode {
            filename,
            key,
            transform,
        } => {
            let key = key.resolve(&settings)?;
            let token = transform.to_token(settings.quality)?;
            println!("{}", token.encode(&filename, &key));
        }
        Command::Inspect {
            token,
            filename,
            key,
        } => {
            let key = key.resolve(&settings)?;
            let token = Token::decode(&token, &filename, &key)?;
            println!("{}", serde_json::to_string_pretty(&token.params())?);
        }
        Command::Render {
            token,
            filename,
            source,
            dest,
            key,
            metadata,
            watermark,
            watermark_frame,
            optimize_after,
        } => {
            let key = key.resolve(&settings)?;
            let token = Token::decode(&token, &filename, &key)?;

            let mut options = RenderOptions {
                metadata,
                background: settings.background,
                ..RenderOptions::default()
            };
            if let Some(mark_path) = watermark {
                let mark = image::open(&mark_path)?.to_rgba8();
                options.watermark = Some(match watermark_frame {
                    Some(frame_path) => {
                        Watermark::with_frame(mark, image::open(&frame_path)?.to_rgba8())
                    }
                    None => Watermark::new(mark),
                });
            }

            let mut renderer = Renderer::new();
            if optimize_after || settings.optimizers {
                renderer = renderer.with_post_processor(Box::new(ExternalOptimizer::new()));
            }

            let target = renderer.render_file(&token, &source, &dest, &options)?;
            println!("{} ({})", dest.display(), target.extension());
        }
        Command::Optimize { paths } => {
            let images = optimize::collect_images(&paths);
            let (optimized, kept, failed) =
                optimize::optimize_all(&ExternalOptimizer::new(), &images);
            println!("{optimized} optimized, {kept} kept, {failed} failed");
        }
    }

    Ok(())
}
