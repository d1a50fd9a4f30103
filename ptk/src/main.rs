use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pipetok::{Tiktoken, TiktokenConfig, TokenInt, Tokenizer, TokenizerFormat};
use std::io::Read;
use std::path::PathBuf;
use std::process::exit;
use tracing::*;
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    globals: Globals,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Globals {
    /// JSON file with tiktoken settings: `pattern`, `special_tokens`, `bos_index`, `eos_index`
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Turn debugging information on
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    debug: u8,

    /// Tokenizer file, or a directory holding a HuggingFace tokenizer.json
    #[arg(short, long, value_name = "PATH", env = "PTK_MODEL", global = true)]
    model: Option<PathBuf>,

    /// Tokenizer format (hf, tiktoken, llama2c, sentencepiece).  Guessed from the model path if
    /// not given.
    #[arg(short, long, env = "PTK_FORMAT", global = true)]
    format: Option<TokenizerFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode text into token ids, printed as a JSON array
    ///
    /// With no TEXT, the text is read from stdin.
    Encode {
        /// Frame the ids with the tokenizer's template, typically a BOS token
        #[arg(long)]
        add_special_tokens: bool,

        /// Prepend this many BOS tokens instead of applying the template
        #[arg(long, default_value_t = 0, conflicts_with = "add_special_tokens")]
        bos: usize,

        /// Append this many EOS tokens instead of applying the template
        #[arg(long, default_value_t = 0, conflicts_with = "add_special_tokens")]
        eos: usize,

        text: Vec<String>,
    },

    /// Decode token ids into text
    ///
    /// With no IDS, whitespace or comma separated ids are read from stdin.
    Decode {
        /// Leave special tokens out of the output
        #[arg(long)]
        skip_special_tokens: bool,

        ids: Vec<TokenInt>,
    },

    /// Print the format, vocabulary size and BOS/EOS tokens as JSON
    Info,
}

impl Commands {
    fn execute(self, globals: &Globals) -> anyhow::Result<()> {
        use Commands::*;

        let tokenizer = load_tokenizer(globals)?;
        match self {
            Encode {
                add_special_tokens,
                bos,
                eos,
                text,
            } => {
                let text = if text.is_empty() {
                    read_stdin()?
                } else {
                    text.join(" ")
                };

                let ids = if bos > 0 || eos > 0 {
                    tokenizer.encode_with_markers(&text, bos, eos)?
                } else {
                    tokenizer.encode(&text, add_special_tokens)?
                };
                debug!(chars = text.chars().count(), tokens = ids.len(), "Encoded text");
                println!("{}", serde_json::to_string(&ids)?);
            }
            Decode {
                skip_special_tokens,
                ids,
            } => {
                let ids = if ids.is_empty() {
                    parse_ids(&read_stdin()?)?
                } else {
                    ids
                };

                println!("{}", tokenizer.decode(&ids, skip_special_tokens)?);
            }
            Info => {
                let pipeline = tokenizer.pipeline();
                let info = serde_json::json!({
                    "format": tokenizer.format().to_string(),
                    "vocab_size": tokenizer.vocab_size(),
                    "special_tokens": pipeline.special_tokens().len(),
                    "bos": tokenizer.bos_token(),
                    "eos": tokenizer.eos_token(),
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
        }

        Ok(())
    }
}

fn load_tokenizer(globals: &Globals) -> anyhow::Result<Tokenizer> {
    let path = globals
        .model
        .as_deref()
        .context("No tokenizer given; pass --model or set PTK_MODEL")?;
    let format = match globals.format {
        Some(format) => format,
        None => TokenizerFormat::detect(path).with_context(|| {
            format!(
                "Can't tell the format of '{}'; pass --format",
                path.display()
            )
        })?,
    };

    let tokenizer = match (format, globals.config.as_deref()) {
        (TokenizerFormat::Tiktoken, Some(config_path)) => {
            let config = std::fs::read(config_path)
                .with_context(|| format!("Reading config file '{}'", config_path.display()))?;
            let config: TiktokenConfig = serde_json::from_slice(&config)
                .with_context(|| format!("Parsing config file '{}'", config_path.display()))?;
            Tokenizer::Tiktoken(Tiktoken::load_with_config(path, &config)?)
        }
        (format, config_path) => {
            if let Some(config_path) = config_path {
                warn!(
                    config = %config_path.display(),
                    %format,
                    "Ignoring the config file, which only applies to tiktoken"
                );
            }
            Tokenizer::load(format, path)?
        }
    };

    Ok(tokenizer)
}

fn read_stdin() -> anyhow::Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Reading from stdin")?;
    Ok(text)
}

fn parse_ids(text: &str) -> anyhow::Result<Vec<TokenInt>> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ',' | '[' | ']'))
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse()
                .with_context(|| format!("'{id}' is not a token id"))
        })
        .collect()
}

fn main() {
    let cli = Cli::parse();
    let default_log_directive = match cli.globals.debug {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_log_directive.into())
                .from_env_lossy(),
        )
        .json()
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = cli.command.execute(&cli.globals) {
        error!("{:#}", e);
        exit(1);
    } else {
        debug!("command executed successfully");
    }
}
