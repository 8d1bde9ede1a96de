use std::process::ExitCode;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use tapestry_core::app::TapestryConfig;
use tapestry_core::{CodecId, Dispatcher, DispatcherBuilder, Envelope, Shape};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Inspect and run registered codecs.
///
/// Bytes are given and printed as lowercase hex, records as JSON objects.
/// TAPESTRY_CONFIG may point to a JSON file of pipelines.
#[derive(Debug, Parser)]
#[clap(name = "tapestry-cli")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered codecs
    List,

    /// Show capabilities of one codec as JSON
    Describe {
        #[clap(value_parser = CodecId::from_str)]
        id: CodecId,
    },

    /// Encode a value with the given codec
    Encode(Payload),

    /// Decode a value with the given codec
    Decode(Payload),
}

#[derive(Debug, Args)]
struct Payload {
    /// Codec id (e.g. `utf8`, `text-wire@v1`)
    #[clap(value_parser = CodecId::from_str)]
    id: CodecId,

    /// Input shape: text, bytes or record
    #[clap(value_parser = Shape::from_str)]
    shape: Shape,

    /// Input value (hex for bytes, JSON object for record)
    input: String,
}

impl Payload {
    fn into_parts(self) -> CliResult<(CodecId, Envelope)> {
        let value = parse_input(self.shape, &self.input)?;
        Ok((self.id, value))
    }
}

fn parse_input(shape: Shape, input: &str) -> CliResult<Envelope> {
    let value = match shape {
        Shape::Text => Envelope::text(input),
        Shape::Bytes => Envelope::bytes(hex::decode(input)?),
        Shape::Record => Envelope::from_tagged(Shape::Record, serde_json::from_str(input)?)?,
    };
    Ok(value)
}

fn render(value: &Envelope) -> CliResult<String> {
    let out = match value {
        Envelope::Text(s) => s.clone(),
        Envelope::Bytes(b) => hex::encode(b),
        Envelope::Record(r) => serde_json::to_string_pretty(r)?,
    };
    Ok(format!("{}: {out}", value.shape()))
}

/// stock codec + 設定ファイルのパイプラインで Dispatcher を組み立てる
fn build_dispatcher() -> CliResult<Dispatcher> {
    let mut builder = DispatcherBuilder::new().with_stock_codecs()?;
    if let Ok(path) = std::env::var("TAPESTRY_CONFIG") {
        tracing::info!(%path, "loading pipeline config");
        builder = builder.config(TapestryConfig::from_path(&path)?);
    }
    Ok(builder.build()?)
}

async fn run(command: Command) -> CliResult<()> {
    let dispatcher = build_dispatcher()?;

    match command {
        Command::List => {
            for id in dispatcher.registry().list().iter() {
                let caps = dispatcher.capabilities(id)?;
                let direction = match (caps.can_encode, caps.can_decode) {
                    (true, true) => "enc/dec",
                    (true, false) => "enc",
                    (false, true) => "dec",
                    (false, false) => "-",
                };
                println!(
                    "{id:<20} {direction:<8} lossless={:<5} {}",
                    caps.lossless,
                    caps.description.as_deref().unwrap_or("")
                );
            }
        }
        Command::Describe { id } => {
            let caps = dispatcher.capabilities(&id)?;
            println!("{}", serde_json::to_string_pretty(&caps)?);
        }
        Command::Encode(payload) => {
            let (id, value) = payload.into_parts()?;
            // codec は blocking の可能性があるので blocking pool で実行
            let out =
                tokio::task::spawn_blocking(move || dispatcher.encode(&id, value)).await??;
            println!("{}", render(&out)?);
        }
        Command::Decode(payload) => {
            let (id, value) = payload.into_parts()?;
            let out =
                tokio::task::spawn_blocking(move || dispatcher.decode(&id, value)).await??;
            println!("{}", render(&out)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("tapestry-cli").chain(args.iter().copied()))
    }

    #[test]
    fn test_parses_encode_with_hex_bytes() {
        let cli = parse(&["encode", "reverse", "bytes", "0102ff"]).unwrap();
        let Command::Encode(payload) = cli.command else {
            panic!("expected encode");
        };
        let (id, value) = payload.into_parts().unwrap();
        assert_eq!(id.as_str(), "reverse");
        assert_eq!(value, Envelope::bytes(vec![1, 2, 255]));
    }

    #[test]
    fn test_parses_describe() {
        let cli = parse(&["describe", "text-wire@v1"]).unwrap();
        assert!(matches!(cli.command, Command::Describe { id } if id.version() == Some(1)));
    }

    #[test]
    fn test_help_is_not_a_usage_error() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);

        let err = parse(&["encode", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_rejects_unknown_shape_and_bad_usage() {
        let err = parse(&["encode", "reverse", "blob", "x"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);

        assert!(parse(&["frobnicate"]).is_err());
        assert!(parse(&["describe", ""]).is_err());
        assert!(parse(&["encode", "reverse", "bytes"]).is_err());
    }

    #[test]
    fn test_bad_hex_is_reported_after_parsing() {
        let cli = parse(&["decode", "reverse", "bytes", "zz"]).unwrap();
        let Command::Decode(payload) = cli.command else {
            panic!("expected decode");
        };
        assert!(payload.into_parts().is_err());
    }

    #[test]
    fn test_renders_bytes_as_hex() {
        assert_eq!(render(&Envelope::bytes(vec![0xab, 0x01])).unwrap(), "bytes: ab01");
        assert_eq!(render(&Envelope::text("hi")).unwrap(), "text: hi");
    }

    #[tokio::test]
    async fn test_stock_dispatcher_round_trips_text() {
        let dispatcher = build_dispatcher().unwrap();
        let utf8 = CodecId::new("utf8").unwrap();
        let wire = dispatcher.encode(&utf8, Envelope::text("weft")).unwrap();
        assert_eq!(render(&wire).unwrap(), "bytes: 77656674");
    }
}
