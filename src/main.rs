//! Skyloft - a terminal client and companion service for Bluesky
#![allow(clippy::uninlined_format_args)]

use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use skyloft::api::{BlueskyClient, FeedPage, ImageUpload, PostDraft, bluesky::DEFAULT_PDS_URL, get_client};
use skyloft::articles::Articles;
use skyloft::auth::{self, CredentialStore};
use skyloft::bookmarks::Bookmarks;
use skyloft::companion::CompanionClient;
use skyloft::config::{Config, Secrets};
use skyloft::embed::render::{RenderContext, render_post, to_plain_text};
use skyloft::{Account, Database};

#[derive(Parser)]
#[command(name = "skyloft", version, about = "🦋 A terminal client for Bluesky", long_about = None, before_help = skyloft::LOGO)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Launch the terminal UI (default)
    Tui,
    /// Sign in with an app password
    Auth {
        /// Handle, e.g. you.bsky.social
        handle: Option<String>,
        /// PDS URL when not hosted on bsky.social
        #[arg(long)]
        pds: Option<String>,
    },
    /// List, switch or remove accounts
    Accounts {
        #[command(subcommand)]
        action: Option<AccountsAction>,
    },
    /// Publish a post
    Post {
        /// Post text
        text: String,
        /// AT URI of the post to reply to
        #[arg(long)]
        reply_to: Option<String>,
        /// AT URI of the post to quote
        #[arg(long)]
        quote: Option<String>,
        /// Image to attach (repeatable, up to 4)
        #[arg(long)]
        image: Vec<PathBuf>,
        /// Alt text for the images
        #[arg(long, default_value = "")]
        alt: String,
    },
    /// Print the home timeline
    #[command(alias = "tl")]
    Timeline {
        /// Number of posts
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Search posts, or accounts with --actors
    Search {
        /// Query
        query: String,
        /// Search accounts instead of posts
        #[arg(long)]
        actors: bool,
        /// Number of results
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Manage bookmarks
    Bookmarks {
        #[command(subcommand)]
        action: BookmarksAction,
    },
    /// Manage long-form articles
    Articles {
        #[command(subcommand)]
        action: ArticlesAction,
    },
    /// Buy a verification badge for the default account
    Verify,
    /// Run the companion HTTP service
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
        /// Address to bind
        #[arg(long)]
        bind: Option<String>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Subcommand)]
enum AccountsAction {
    /// List accounts (default)
    List,
    /// Make an account the default
    Default { account: String },
    /// Remove an account and its stored credentials
    Remove { account: String },
}

#[derive(Subcommand)]
enum BookmarksAction {
    /// List bookmarked posts
    List,
    /// Bookmark a post by AT URI
    Add { uri: String },
    /// Remove a bookmark by AT URI
    Remove { uri: String },
}

#[derive(Subcommand)]
enum ArticlesAction {
    /// List your articles
    List,
    /// Print an article
    Show { rkey: String },
    /// Publish an article; the body is read from --file or stdin
    New {
        /// Title
        #[arg(long)]
        title: String,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Markdown file with the body
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete an article
    Delete { rkey: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    // RUST_LOG overrides; the service is chattier by default
    let default_filter = if matches!(cli.command, Some(Command::Serve { .. })) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load()?;
    match cli.command.unwrap_or(Command::Tui) {
        // The TUI owns its own runtime
        Command::Tui => skyloft::app::run(config),
        command => tokio::runtime::Runtime::new()?.block_on(run_command(command, config)),
    }
}

async fn run_command(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Tui => bail!("The terminal UI cannot start inside the async runtime"),
        Command::Auth { handle, pds } => auth_flow(handle, pds).await,
        Command::Accounts { action } => accounts(action.unwrap_or(AccountsAction::List)),
        Command::Post {
            text,
            reply_to,
            quote,
            image,
            alt,
        } => post_cli(&text, reply_to, quote, &image, &alt).await,
        Command::Timeline { limit } => {
            let (_, client) = login().await?;
            let page = client.timeline(None, limit).await?;
            print_posts(&config, &page);
            Ok(())
        }
        Command::Search { query, actors, limit } => search_cli(&config, &query, actors, limit).await,
        Command::Bookmarks { action } => bookmarks_cli(&config, action).await,
        Command::Articles { action } => articles_cli(&config, action).await,
        Command::Verify => verify_cli(&config).await,
        Command::Serve { port, bind, timeout } => {
            let mut server = config.server;
            if let Some(port) = port {
                server.port = port;
            }
            if let Some(bind) = bind {
                server.bind = bind;
            }
            if let Some(timeout) = timeout {
                server.timeout_secs = timeout;
            }
            skyloft::server::run_server(server, Secrets::from_env()).await
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn auth_flow(handle: Option<String>, pds: Option<String>) -> Result<()> {
    println!("🦋 Signing in to Bluesky");

    let handle = match handle {
        Some(h) => h,
        None => prompt("Handle (e.g. you.bsky.social): ")?,
    };
    let handle = handle.trim_start_matches('@').to_string();
    let pds_url = match pds {
        Some(p) => p,
        None => prompt("PDS URL (Enter for bsky.social): ")?,
    };
    let pds_url = if pds_url.is_empty() {
        DEFAULT_PDS_URL.to_string()
    } else if pds_url.starts_with("http") {
        pds_url
    } else {
        format!("https://{pds_url}")
    };

    println!("Create an app password at https://bsky.app/settings/app-passwords");
    let password = prompt("App password: ")?;

    let client = BlueskyClient::login_with_pds(&handle, &password, &pds_url)
        .await
        .context("Login failed")?;
    let profile = client.profile(client.did()).await?;

    let db = Database::open()?;
    let mut account = db
        .find_account(client.did())?
        .unwrap_or_else(|| Account::with_pds(client.did(), client.handle(), profile.name(), &pds_url));
    account.handle = client.handle().to_string();
    account.display_name = profile.name().to_string();
    account.pds_url = pds_url.trim_end_matches('/').to_string();
    account.avatar_url = profile.avatar.clone();
    account.is_default = account.is_default || db.get_default_account()?.is_none();
    db.upsert_account(&account)?;

    let store = CredentialStore::open()?;
    store.store_password(&account, &password)?;
    store.store_session(&account, client.session())?;

    println!("✓ Logged in as @{}", account.handle);
    println!("✓ Account saved (PDS: {})", account.pds_url);
    Ok(())
}

fn accounts(action: AccountsAction) -> Result<()> {
    let db = Database::open()?;
    match action {
        AccountsAction::List => {
            let accounts = db.get_accounts()?;
            if accounts.is_empty() {
                println!("No accounts. Run `skyloft auth` to sign in.");
            }
            for account in accounts {
                let default = if account.is_default { " (default)" } else { "" };
                let creds = if auth::has_credentials(&account) { "" } else { " [no credentials]" };
                println!("{} {}{default}{creds}", account.at_handle(), account.did);
            }
        }
        AccountsAction::Default { account } => {
            let account = db
                .find_account(&account)?
                .ok_or_else(|| anyhow!("No account {account}"))?;
            db.set_default_account(account.id)?;
            println!("✓ {} is now the default", account.at_handle());
        }
        AccountsAction::Remove { account } => {
            let account = db
                .find_account(&account)?
                .ok_or_else(|| anyhow!("No account {account}"))?;
            auth::delete_credentials(&account)?;
            db.delete_account(account.id)?;
            println!("✓ Removed {}", account.at_handle());
        }
    }
    Ok(())
}

/// Log in as the default account
async fn login() -> Result<(Account, BlueskyClient)> {
    let db = Database::open()?;
    let account = db
        .get_default_account()?
        .or(db.get_accounts()?.into_iter().next())
        .ok_or_else(|| anyhow!("No account configured. Run `skyloft auth` first."))?;

    let store = CredentialStore::open()?;
    if let Some(session) = store.session(&account)? {
        let mut client = BlueskyClient::from_session(&account.pds_url, session);
        if client.refresh().await.is_ok() {
            store.store_session(&account, client.session())?;
            db.update_account_last_used(account.id)?;
            return Ok((account, client));
        }
    }

    let password = store
        .password(&account)?
        .ok_or_else(|| anyhow!("No app password stored for {}. Run `skyloft auth`.", account.at_handle()))?;
    let client = get_client(&account, &password).await?;
    store.store_session(&account, client.session())?;
    db.update_account_last_used(account.id)?;
    Ok((account, client))
}

async fn fetch_post(client: &BlueskyClient, uri: &str) -> Result<skyloft::Post> {
    client
        .posts(&[uri.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Post not found: {uri}"))
}

async fn post_cli(
    text: &str,
    reply_to: Option<String>,
    quote: Option<String>,
    images: &[PathBuf],
    alt: &str,
) -> Result<()> {
    let (_, client) = login().await?;

    let mut draft = PostDraft::text(text);
    if let Some(uri) = reply_to {
        draft.reply = Some(fetch_post(&client, &uri).await?.reply_ref_for_answer());
    }
    if let Some(uri) = quote {
        draft.quote = Some(fetch_post(&client, &uri).await?.strong_ref());
    }
    draft.images = images
        .iter()
        .map(|path| ImageUpload::from_path(path, alt))
        .collect::<Result<_>>()?;
    draft.validate()?;

    let created = client.post(&draft).await?;
    println!("✓ Posted {}", created.uri);
    Ok(())
}

fn print_posts(config: &Config, page: &FeedPage) {
    let colors = config.theme.colors();
    let verified = std::collections::HashSet::new();
    let ctx = RenderContext {
        colors: &colors,
        max_depth: config.embed_depth,
        verified: &verified,
    };
    for post in &page.posts {
        println!("{}", to_plain_text(&render_post(post, &ctx)));
        println!("  {}", post.uri);
        println!();
    }
    if page.posts.is_empty() {
        println!("Nothing to show.");
    }
}

async fn search_cli(config: &Config, query: &str, actors: bool, limit: usize) -> Result<()> {
    let (_, client) = login().await?;
    if actors {
        for profile in client.search_actors(query, limit).await? {
            println!("{} @{} ({})", profile.name(), profile.handle, profile.did);
            if let Some(bio) = profile.description.as_deref().filter(|d| !d.is_empty()) {
                println!("  {}", bio.replace('\n', " "));
            }
        }
    } else {
        let page = client.search_posts(query, None, limit).await?;
        print_posts(config, &page);
    }
    Ok(())
}

async fn bookmarks_cli(config: &Config, action: BookmarksAction) -> Result<()> {
    let (_, client) = login().await?;
    let records = client.records();
    let bookmarks = Bookmarks::new(&records);
    match action {
        BookmarksAction::List => {
            let posts = bookmarks.hydrate(&client).await?;
            print_posts(config, &FeedPage { posts, cursor: None });
        }
        BookmarksAction::Add { uri } => {
            let post = fetch_post(&client, &uri).await?;
            bookmarks.add(&post).await?;
            println!("🔖 Bookmarked {uri}");
        }
        BookmarksAction::Remove { uri } => {
            if bookmarks.remove(&uri).await? {
                println!("✓ Removed bookmark {uri}");
            } else {
                println!("{uri} was not bookmarked");
            }
        }
    }
    Ok(())
}

async fn articles_cli(config: &Config, action: ArticlesAction) -> Result<()> {
    let (_, client) = login().await?;
    let records = client.records();
    let articles = Articles::new(&records);
    match action {
        ArticlesAction::List => {
            for article in articles.list().await? {
                println!(
                    "{}  {}  ({} min read)",
                    article.rkey,
                    article.title,
                    article.reading_minutes()
                );
            }
        }
        ArticlesAction::Show { rkey } => {
            let article = articles
                .get(&rkey)
                .await?
                .ok_or_else(|| anyhow!("No article {rkey}"))?;
            println!("# {}\n", article.title);
            if !article.tags.is_empty() {
                println!("{}\n", article.tags.iter().map(|t| format!("#{t}")).collect::<Vec<_>>().join(" "));
            }
            println!("{}", article.body);

            let companion = CompanionClient::new(&config.server_url);
            match companion.record_view(&format!("article/{rkey}")).await {
                Ok(views) => println!("\n👁 {views} views"),
                Err(e) => tracing::debug!("view count unavailable: {e:#}"),
            }
        }
        ArticlesAction::New { title, tags, file } => {
            let body = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut body = String::new();
                    std::io::stdin().read_to_string(&mut body)?;
                    body
                }
            };
            let article = articles.create(&title, &body, &tags).await?;
            println!("✓ Published {} ({})", article.title, article.rkey);
        }
        ArticlesAction::Delete { rkey } => {
            articles.delete(&rkey).await?;
            println!("✓ Deleted {rkey}");
        }
    }
    Ok(())
}

async fn verify_cli(config: &Config) -> Result<()> {
    let (account, _) = login().await?;
    let companion = CompanionClient::new(&config.server_url);

    let status = companion.verification(&account.did).await?;
    if status.verified {
        println!("✓ {} already has a badge", account.at_handle());
        return Ok(());
    }

    let order = companion.create_order(&account.did).await?;
    println!("💳 Approve the payment in your browser:\n\n  {}\n", order.approve_url);
    if let Err(e) = open::that(&order.approve_url) {
        tracing::debug!("could not open browser: {e}");
    }
    prompt("Press Enter once you have approved the payment...")?;

    // The return page usually captured the order already
    if companion.verification(&account.did).await?.verified {
        println!("✓ {} is verified", account.at_handle());
        return Ok(());
    }

    let report = companion.capture_order(&order.id).await?;
    if report.verified {
        println!("✓ {} is verified", account.at_handle());
        Ok(())
    } else {
        bail!("Payment not completed (status {})", report.status)
    }
}
