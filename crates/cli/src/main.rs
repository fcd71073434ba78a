use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use lib::relay::ANSWER_SENTINEL;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "iris")]
#[command(about = "Iris CLI: streaming multimodal chat relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config and image storage).
    Init {
        /// Config file path (default: IRIS_CONFIG_PATH or ~/.iris/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (chat WebSocket at /chat, image upload/delete, stored images at /objects).
    Gateway {
        /// Config file path (default: IRIS_CONFIG_PATH or ~/.iris/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP and WebSocket port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat through a running gateway (interactive). `/image <url>` attaches an image to the next message.
    Chat {
        /// Config file path (default: IRIS_CONFIG_PATH or ~/.iris/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Image URL to attach to the first message (repeatable).
        #[arg(long = "image", value_name = "URL")]
        images: Vec<String>,

        /// Seconds to wait for the next frame before giving up on an answer.
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("iris {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat {
            config,
            images,
            timeout,
        }) => {
            if let Err(e) = run_chat(config, images, Duration::from_secs(timeout)).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    lib::gateway::run_gateway(config, path).await
}

/// One line of user input, after slash commands are applied.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Exit,
    Image(String),
    Message(String),
    Skip,
}

fn parse_input(line: &str) -> Input {
    let input = line.trim();
    if input.is_empty() {
        return Input::Skip;
    }
    if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
        return Input::Exit;
    }
    if let Some(rest) = input.strip_prefix("/image") {
        if rest.is_empty() {
            return Input::Skip;
        }
        if rest.starts_with(char::is_whitespace) {
            return Input::Image(rest.trim().to_string());
        }
    }
    Input::Message(input.to_string())
}

/// Gateway WebSocket URL from config; wildcard binds are reached over loopback.
fn chat_url(config: &lib::config::Config) -> String {
    let bind = match config.gateway.bind.trim() {
        "0.0.0.0" | "" => "127.0.0.1",
        "::" => "[::1]",
        other => other,
    };
    format!("ws://{}:{}/chat", bind, config.gateway.port)
}

/// How one answer ended on the client side.
#[derive(Debug, PartialEq, Eq)]
enum AnswerEnd {
    Complete,
    TimedOut,
}

/// Print fragments to `out` until the sentinel frame. Gives up when no frame arrives
/// within `frame_timeout`; errors when the gateway closes the connection.
async fn read_answer<S, W>(
    ws: &mut S,
    frame_timeout: Duration,
    out: &mut W,
) -> anyhow::Result<AnswerEnd>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    W: std::io::Write,
{
    use anyhow::Context;

    loop {
        let frame = match tokio::time::timeout(frame_timeout, ws.next()).await {
            Err(_) => return Ok(AnswerEnd::TimedOut),
            Ok(None) => anyhow::bail!("gateway closed the connection"),
            Ok(Some(frame)) => frame.context("reading answer")?,
        };
        match frame {
            Message::Text(text) if text == ANSWER_SENTINEL => return Ok(AnswerEnd::Complete),
            Message::Text(text) => {
                write!(out, "{}", text)?;
                out.flush()?;
            }
            Message::Close(_) => anyhow::bail!("gateway closed the connection"),
            _ => {}
        }
    }
}

type GatewaySocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(url: &str) -> anyhow::Result<GatewaySocket> {
    use anyhow::Context;

    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("connecting to {}", url))?;
    log::info!("connected to {}", url);
    Ok(ws)
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    images: Vec<String>,
    frame_timeout: Duration,
) -> anyhow::Result<()> {
    use anyhow::Context;
    use std::io::{self, Write};

    let (config, _) = lib::config::load_config(config_path)?;
    let url = chat_url(&config);
    let mut ws = connect(&url).await?;

    let mut pending_images = images;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let content = match parse_input(&line) {
            Input::Exit => break,
            Input::Skip => continue,
            Input::Image(url) => {
                pending_images.push(url);
                println!("({} image(s) queued)", pending_images.len());
                continue;
            }
            Input::Message(content) => content,
        };

        let request = serde_json::json!({
            "content": content,
            "images": std::mem::take(&mut pending_images),
        });
        ws.send(Message::Text(request.to_string()))
            .await
            .context("sending request")?;

        write!(stdout, "< ")?;
        stdout.flush()?;
        let end = read_answer(&mut ws, frame_timeout, &mut stdout).await;
        writeln!(stdout)?;
        if end? == AnswerEnd::TimedOut {
            // late frames of the abandoned answer would bleed into the next one
            eprintln!(
                "no answer within {}s (request dropped or upstream failed); reconnecting, conversation history is reset",
                frame_timeout.as_secs()
            );
            let _ = ws.close(None).await;
            ws = connect(&url).await?;
        }
    }

    let _ = ws.close(None).await;
    Ok(())
}
