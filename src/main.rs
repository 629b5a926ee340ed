// SPDX-License-Identifier: MPL-2.0

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use skyref::atproto::{Media, Post, PostResolver, Profile, SkyClient, uri};
use skyref::config::Credentials;
use skyref::state::Settings;
use skyref::logging;
use tracing::info;

/// Resolve Bluesky post links and show what they point at.
#[derive(Parser, Debug)]
#[command(name = "skyref", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the DID, record key and at:// URI behind a post URL
    Resolve { url: String },
    /// Turn an at:// post URI into a bsky.app link
    Link { at_uri: String },
    /// Fetch and print a post with its author
    Post {
        #[arg(required_unless_present = "actor")]
        url: Option<String>,
        /// Handle or DID of the author, instead of a URL
        #[arg(long, conflicts_with = "url", requires = "rkey")]
        actor: Option<String>,
        /// Record key of the post, with --actor
        #[arg(long, requires = "actor")]
        rkey: Option<String>,
        /// Include parent posts and replies
        #[arg(long)]
        thread: bool,
    },
    /// Log in with BSKY_USERNAME / BSKY_PASSWORD and reply to a post
    Reply { url: String, text: String },
    /// Log in with BSKY_USERNAME / BSKY_PASSWORD and list the home timeline
    Timeline {
        #[arg(long)]
        limit: Option<u8>,
        #[arg(long)]
        cursor: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = logging::init_logging() {
        eprintln!("{err:#}");
    }

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("skyref error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Link { at_uri } => {
            println!("{}", uri::protocol_uri_to_url(&at_uri));
            Ok(())
        }
        Command::Resolve { url } => {
            let resolver = PostResolver::new(client()?);
            let reference = resolver.resolve_post_url(&url).await?;
            println!("did:     {}", reference.did());
            println!("rkey:    {}", reference.record_key());
            println!("uri:     {}", reference.at_uri());
            println!("link:    {}", reference.web_url());
            Ok(())
        }
        Command::Post {
            url,
            actor,
            rkey,
            thread,
        } => {
            let resolver = PostResolver::new(client()?);
            let reference = match (url, actor, rkey) {
                (Some(url), _, _) => resolver.resolve_post_url(&url).await?,
                (None, Some(actor), Some(rkey)) => resolver.resolve_post(&actor, &rkey).await?,
                _ => bail!("give a post URL or --actor with --rkey"),
            };
            let client = resolver.lookup();

            let posts = if thread {
                client
                    .get_thread(&reference)
                    .await
                    .with_context(|| format!("fetching thread {reference}"))?
            } else {
                vec![
                    client
                        .get_post(&reference)
                        .await
                        .with_context(|| format!("fetching post {reference}"))?,
                ]
            };

            let profile = client
                .get_profile(reference.did())
                .await
                .with_context(|| format!("fetching profile {}", reference.did()))?;
            print_profile(&profile);

            for post in &posts {
                println!();
                print_post(post, post.uri == reference.at_uri());
            }
            Ok(())
        }
        Command::Reply { url, text } => {
            let resolver = PostResolver::new(client()?);
            let parent = resolver.resolve_post_url(&url).await?;
            let client = resolver.lookup();

            let credentials = Credentials::from_env()?;
            client.login(&credentials).await?;

            let reply = client
                .reply(&parent, &text)
                .await
                .with_context(|| format!("replying to {parent}"))?;
            println!("{}", reply.web_url());
            Ok(())
        }
        Command::Timeline { limit, cursor } => {
            let client = client()?;
            let limit = limit.unwrap_or(client.settings().timeline_limit);
            if limit == 0 || limit > 100 {
                bail!("--limit must be between 1 and 100");
            }

            let credentials = Credentials::from_env()?;
            let session = client.login(&credentials).await?;
            println!("Home (Following) for @{}:\n", session.handle);

            let (items, next) = client.get_timeline(limit, cursor.as_deref()).await?;
            for item in &items {
                println!("{}", item.summary());
                println!("    {}", item.post.web_url());
            }
            if let Some(next) = next {
                println!("\nnext cursor: {next}");
            }
            Ok(())
        }
    }
}

fn client() -> Result<SkyClient> {
    let settings = Settings::load();
    info!(appview = %settings.appview_url, "using AppView");
    SkyClient::new(settings).context("building client")
}

fn print_profile(profile: &Profile) {
    println!("{} (@{})", profile.name(), profile.handle);
    println!("  {}", profile.web_url());
    if let Some(avatar) = &profile.avatar {
        println!("  avatar: {avatar}");
    }
    if let (Some(followers), Some(following)) = (profile.followers_count, profile.following_count)
    {
        println!("  {followers} followers, {following} following");
    }
}

fn print_post(post: &Post, focused: bool) {
    let marker = if focused { ">" } else { " " };
    println!(
        "{marker} {} (@{}) at {}",
        post.author.name(),
        post.author.handle,
        format_timestamp(&post.created_at)
    );
    for line in post.text.lines() {
        println!("  {line}");
    }

    match &post.media {
        Media::None => {}
        Media::Images(images) => {
            for image in images {
                if image.alt.is_empty() {
                    println!("  [image] {}", image.fullsize);
                } else {
                    println!("  [image] {} ({})", image.fullsize, image.alt);
                }
            }
        }
        Media::Video(video) => println!("  [video] {}", video.playlist),
    }

    println!(
        "  {} replies, {} reposts, {} likes",
        post.reply_count.unwrap_or(0),
        post.repost_count.unwrap_or(0),
        post.like_count.unwrap_or(0)
    );
    println!("  {}", post.web_url());
}

fn format_timestamp(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}
