use std::path::{Component, Path, PathBuf};
use std::sync::Once;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use packvm_core::{
    Codec,
    options::CodecOptions,
    schema::document::SchemaDocument,
    val::{self, Format, Val},
    vm::Compiler,
};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "packvm_core=info,packvm_cli=info";


#[derive(Debug, Parser)]
#[command(
    name = "packvm",
    author,
    version,
    about = "Compile binary layout schemas and run them over files",
    long_about = None
)]
struct CliArgs {
    /// Document whose `codec` section sets run-time limits
    #[arg(long, global = true, value_name = "FILE", value_parser = parse_sanitized_path)]
    config: Option<PathBuf>,

    /// Largest loop bound a single run may take (overrides the config file)
    #[arg(long, global = true, value_name = "N")]
    max_iterations: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DocFormat {
    Json,
    Yaml,
    Toml,
}

impl From<DocFormat> for Format {
    fn from(value: DocFormat) -> Self {
        match value {
            DocFormat::Json => Format::Json,
            DocFormat::Yaml => Format::Yaml,
            DocFormat::Toml => Format::Toml,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compile a schema document and report the program size.
    Check {
        #[arg(value_name = "SCHEMA", value_parser = parse_sanitized_path)]
        schema: PathBuf,
    },
    /// Decode a binary file and print the value.
    Decode {
        #[arg(value_name = "SCHEMA", value_parser = parse_sanitized_path)]
        schema: PathBuf,
        #[arg(value_name = "INPUT", value_parser = parse_sanitized_path)]
        input: PathBuf,
        /// Output document format
        #[arg(long, value_enum, default_value_t = DocFormat::Json)]
        format: DocFormat,
    },
    /// Encode a JSON/YAML/TOML value into a binary file.
    Encode {
        #[arg(value_name = "SCHEMA", value_parser = parse_sanitized_path)]
        schema: PathBuf,
        #[arg(value_name = "VALUE", value_parser = parse_sanitized_path)]
        value: PathBuf,
        #[arg(short, long, value_name = "OUTPUT", value_parser = parse_sanitized_path)]
        output: PathBuf,
    },
}

fn read_file_content(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("Failed to read file '{}': {}", path.display(), e))
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn format_of(path: &Path) -> Option<Format> {
    path.extension().and_then(|ext| ext.to_str()).and_then(Format::from_extension)
}

fn init_tracing() {
    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let builder = fmt().with_writer(std::io::stderr);
        let builder = match std::env::var("PACKVM_LOG")
            .ok()
            .and_then(|expr| EnvFilter::try_new(expr).ok())
        {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn load_options(config: Option<&Path>, max_iterations: Option<usize>) -> anyhow::Result<CodecOptions> {
    let mut options = match config {
        Some(path) => {
            let src = read_file_content(path)?;
            CodecOptions::from_document(&src, format_of(path))
                .with_context(|| format!("failed to load config '{}'", path.display()))?
        }
        None => CodecOptions::default(),
    };
    if let Some(max) = max_iterations {
        options.max_iterations = Some(max);
    }
    Ok(options)
}

fn load_codec(schema: &Path, options: CodecOptions) -> anyhow::Result<Codec> {
    let src = read_file_content(schema)?;
    let doc = SchemaDocument::parse(&src, format_of(schema))
        .with_context(|| format!("failed to load schema '{}'", schema.display()))?;
    Compiler::new()
        .with_options(options)
        .compile(doc.root())
        .with_context(|| format!("failed to compile schema '{}'", schema.display()))
}

fn render(value: &Val, format: DocFormat) -> anyhow::Result<String> {
    Ok(match format {
        DocFormat::Json => serde_json::to_string_pretty(value)? + "\n",
        DocFormat::Yaml => serde_yaml::to_string(value)?,
        DocFormat::Toml => toml::to_string(value)?,
    })
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    let options = load_options(args.config.as_deref(), args.max_iterations)?;

    match args.command {
        Commands::Check { schema } => {
            let codec = load_codec(&schema, options)?;
            let programs = codec.programs();
            println!(
                "ok: {} instructions, {} subroutines",
                programs.decode.len(),
                programs.subroutines
            );
        }
        Commands::Decode { schema, input, format } => {
            let codec = load_codec(&schema, options)?;
            let bytes = std::fs::read(&input).with_context(|| format!("Failed to read file '{}'", input.display()))?;
            let value = codec
                .decode(&bytes)
                .with_context(|| format!("failed to decode '{}'", input.display()))?;
            print!("{}", render(&value, format)?);
        }
        Commands::Encode { schema, value, output } => {
            let codec = load_codec(&schema, options)?;
            let src = read_file_content(&value)?;
            let input = val::parse_with_format(&src, format_of(&value))
                .with_context(|| format!("failed to parse value '{}'", value.display()))?;
            let bytes = codec
                .encode(&input)
                .with_context(|| format!("failed to encode '{}'", value.display()))?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write file '{}'", output.display()))?;
            tracing::info!(bytes = bytes.len(), output = %output.display(), "encoded value");
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    run(CliArgs::parse())
}
