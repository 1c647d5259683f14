use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use docqa_core::config::{
    DEFAULT_API_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_CHAT_URL, DEFAULT_FRONTEND_URL,
    DEFAULT_PORT, DEFAULT_SUPAVEC_URL,
};
use docqa_core::models::MAX_UPLOAD_BYTES;
use docqa_core::{
    serve, ChatCompletionsModel, ChatSession, CycleOutcome, DocumentStoreConfig, FileCatalog,
    FlowError, Gateway, GatewayClient, GatewayConfig, LanguageModelConfig, OrderDirection,
    QuestionFlow, Role, ServerConfig, SupavecStore, TranscriptEntry, UploadReceipt,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docqa", version, about = "Ask questions about your uploaded documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Gateway API root used by the client subcommands
    #[arg(long, env = "DOCQA_API_BASE_URL", default_value = DEFAULT_API_BASE_URL, global = true)]
    api_base_url: String,

    /// Seconds to wait on any single upstream call
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 60, global = true)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve(ServeArgs),
    /// Upload a PDF or text file.
    Upload {
        /// File to upload; its type is guessed from the extension.
        path: PathBuf,
    },
    /// Store raw text as a document.
    UploadText {
        /// Document name.
        #[arg(long)]
        name: String,
        /// Text to store. Read from `--file` when omitted.
        #[arg(long, conflicts_with = "file")]
        contents: Option<String>,
        /// Read the text from this file.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List uploaded documents, newest first by default.
    Files {
        /// Page size.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Sort order, `asc` or `desc`.
        #[arg(long, default_value = "desc")]
        order_dir: OrderDirection,
        /// Keep paging until the listing is exhausted.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Ask one question against the given documents.
    Ask {
        /// Document id to search; repeat for several.
        #[arg(long = "file-id", required = true)]
        file_ids: Vec<String>,
        /// The question.
        question: String,
    },
    /// Interactive chat over stdin.
    Chat {
        /// Documents selected at start; repeat for several.
        #[arg(long = "file-id")]
        file_ids: Vec<String>,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Listening port
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Origin allowed by CORS
    #[arg(long, env = "FRONTEND_URL", default_value = DEFAULT_FRONTEND_URL)]
    frontend_url: String,

    /// Supavec base URL
    #[arg(long, env = "SUPAVEC_URL", default_value = DEFAULT_SUPAVEC_URL)]
    supavec_url: String,

    /// Supavec API key, sent as the authorization header
    #[arg(long, env = "SUPAVEC_API_KEY", hide_env_values = true)]
    supavec_api_key: Option<String>,

    /// Chat-completions endpoint
    #[arg(long, env = "GAIA_URL", default_value = DEFAULT_CHAT_URL)]
    gaia_url: String,

    /// Model name sent with every completion
    #[arg(long, env = "GAIA_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    gaia_model: String,

    /// Optional bearer token for the chat endpoint
    #[arg(long, env = "GAIA_API_KEY", hide_env_values = true)]
    gaia_api_key: Option<String>,

    /// Directory for staged uploads; defaults to the system temp dir
    #[arg(long, env = "UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_secs.max(1));

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docqa boot"
    );

    match cli.command {
        Command::Serve(args) => run_server(args, timeout).await?,
        Command::Upload { path } => {
            let client = GatewayClient::new(&cli.api_base_url, timeout)?;
            let receipt = upload_path(&client, &path).await?;
            println!("uploaded {} as {}", path.display(), receipt.file_id);
        }
        Command::UploadText {
            name,
            contents,
            file,
        } => {
            let contents = match (contents, file) {
                (Some(contents), _) => contents,
                (None, Some(file)) => tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?,
                (None, None) => anyhow::bail!("either --contents or --file is required"),
            };
            let client = GatewayClient::new(&cli.api_base_url, timeout)?;
            let receipt = client.upload_text(&name, &contents).await?;
            println!("stored {name} as {}", receipt.file_id);
        }
        Command::Files {
            limit,
            order_dir,
            all,
        } => {
            let client = GatewayClient::new(&cli.api_base_url, timeout)?;
            let mut catalog = FileCatalog::new(limit, order_dir);
            loop {
                let page = client.list_files(&catalog.next_page()).await?;
                catalog.append_page(page);
                if !all || !catalog.has_more() {
                    break;
                }
            }
            print_catalog(&catalog, &[]);
            if catalog.has_more() {
                println!("... more available, rerun with --all");
            }
        }
        Command::Ask { file_ids, question } => {
            let client = GatewayClient::new(&cli.api_base_url, timeout)?;
            let flow = QuestionFlow::new(client);
            let session = ChatSession::new();
            for file_id in &file_ids {
                session.select(file_id);
            }

            let outcome = flow.submit(&session, &question).await?;
            print_entries(&session.transcript());
            if !outcome.is_answered() {
                std::process::exit(1);
            }
        }
        Command::Chat { file_ids } => {
            let client = GatewayClient::new(&cli.api_base_url, timeout)?;
            run_chat(QuestionFlow::new(client), file_ids).await?;
        }
    }

    Ok(())
}

async fn run_server(args: ServeArgs, timeout: Duration) -> anyhow::Result<()> {
    let staging_dir = match args.upload_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("creating upload dir {}", dir.display()))?;
            dir
        }
        None => std::env::temp_dir(),
    };

    if args.supavec_api_key.is_none() {
        warn!("SUPAVEC_API_KEY is not set; document store calls will be unauthenticated");
    }

    let store = SupavecStore::new(&DocumentStoreConfig {
        base_url: args.supavec_url,
        api_key: args.supavec_api_key,
        timeout,
    })?;
    let model = ChatCompletionsModel::new(&LanguageModelConfig {
        url: args.gaia_url,
        model: args.gaia_model,
        api_key: args.gaia_api_key,
        timeout,
    })?;
    let gateway = Gateway::new(
        store,
        model,
        GatewayConfig {
            upstream_timeout: timeout,
            staging_dir,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        },
    );

    let config = ServerConfig {
        port: args.port,
        frontend_url: args.frontend_url,
    };
    serve(Arc::new(gateway), &config, shutdown_signal()).await?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "cannot listen for ctrl-c; shutting down");
    }
}

async fn upload_path(client: &GatewayClient, path: &Path) -> anyhow::Result<UploadReceipt> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Ok(client
        .upload_file(&file_name, mime.essence_str(), bytes)
        .await?)
}

fn print_catalog(catalog: &FileCatalog, selection: &[String]) {
    if catalog.is_empty() {
        println!("no documents uploaded yet");
        return;
    }
    for (index, file) in catalog.files().iter().enumerate() {
        let marker = if selection.contains(&file.file_id) { "*" } else { " " };
        let created = file
            .created_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{marker} {:>3}. {:<48} {} {}",
            index + 1,
            catalog.label(file),
            created,
            file.file_id
        );
    }
}

fn print_entries(entries: &[TranscriptEntry]) {
    for entry in entries {
        match entry.role {
            Role::User => println!("you> {}", entry.content),
            Role::Assistant => println!("\n{}\n", entry.content),
            Role::SystemError => eprintln!("! {}", entry.content),
        }
    }
}

const CHAT_HELP: &str = "\
commands:
  /files            show loaded documents (* = selected)
  /more             load the next page of documents
  /select <n|id>    toggle a document by list number or id
  /clear            deselect everything
  /upload <path>    upload a file and select it
  /quit             leave
anything else is asked as a question";

async fn run_chat(flow: QuestionFlow<GatewayClient>, file_ids: Vec<String>) -> anyhow::Result<()> {
    let session = ChatSession::new();
    for file_id in &file_ids {
        session.select(file_id);
    }
    load_next_page(&flow, &session).await;

    println!("{CHAT_HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, argument) = line
            .split_once(char::is_whitespace)
            .map(|(command, rest)| (command, rest.trim()))
            .unwrap_or((line, ""));

        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{CHAT_HELP}"),
            "/files" => print_catalog(&session.catalog(), &session.selection()),
            "/more" => {
                if session.catalog().has_more() {
                    load_next_page(&flow, &session).await;
                    print_catalog(&session.catalog(), &session.selection());
                } else {
                    println!("no more documents");
                }
            }
            "/select" => {
                let catalog = session.catalog();
                let file_id = argument
                    .parse::<usize>()
                    .ok()
                    .and_then(|number| number.checked_sub(1))
                    .and_then(|index| catalog.files().get(index))
                    .map(|file| file.file_id.clone())
                    .unwrap_or_else(|| argument.to_string());
                if file_id.is_empty() {
                    println!("usage: /select <n|id>");
                } else if session.toggle_selection(&file_id) {
                    println!("selected {file_id}");
                } else {
                    println!("deselected {file_id}");
                }
            }
            "/clear" => session.clear_selection(),
            "/upload" => {
                if argument.is_empty() {
                    println!("usage: /upload <path>");
                    continue;
                }
                match upload_path(flow.backend(), Path::new(argument)).await {
                    Ok(receipt) => {
                        session.record_upload(&receipt);
                        refresh_catalog(&flow, &session).await;
                        println!("uploaded and selected {}", receipt.file_id);
                    }
                    Err(error) => eprintln!("! upload failed: {error:#}"),
                }
            }
            _ if !session.can_submit() => {
                if session.selection().is_empty() {
                    eprintln!("! select at least one document first (/files, /select)");
                } else {
                    eprintln!("! still answering the last question");
                }
            }
            _ => {
                let before = session.transcript().len();
                match flow.submit(&session, line).await {
                    Ok(CycleOutcome::Answered { .. })
                    | Ok(CycleOutcome::SearchFailed { .. })
                    | Ok(CycleOutcome::GenerationFailed { .. }) => {
                        let transcript = session.transcript();
                        let fresh: Vec<_> = transcript[before..]
                            .iter()
                            .filter(|entry| entry.role != Role::User)
                            .cloned()
                            .collect();
                        print_entries(&fresh);
                    }
                    Err(FlowError::InvalidInput(message)) => eprintln!("! {message}"),
                    Err(FlowError::SessionBusy) => eprintln!("! still answering the last question"),
                }
            }
        }
    }

    Ok(())
}

async fn load_next_page(flow: &QuestionFlow<GatewayClient>, session: &ChatSession) {
    let request = session.catalog().next_page();
    match flow.backend().list_files(&request).await {
        Ok(page) => session.with_catalog_mut(|catalog| catalog.append_page(page)),
        Err(error) => warn!(kind = error.kind().code(), "could not load documents: {error}"),
    }
}

async fn refresh_catalog(flow: &QuestionFlow<GatewayClient>, session: &ChatSession) {
    let request = session.catalog().first_page();
    match flow.backend().list_files(&request).await {
        Ok(page) => session.with_catalog_mut(|catalog| catalog.refresh(page)),
        Err(error) => warn!(kind = error.kind().code(), "could not refresh documents: {error}"),
    }
}
