use anyhow::{anyhow, bail, Context as _, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::{debug, warn};
use reqwest::Url;
use spotify_session::api::{validate_id, DEFAULT_LIMIT, DEFAULT_PLAYLIST_TRACKS_LIMIT};
use spotify_session::models::playlist_url;
use spotify_session::prelude::*;
use spotify_session::server::DEFAULT_REDIRECT_TIMEOUT;
use std::sync::Arc;

const APP_NAME: &str = "spotify-session";

#[derive(Parser)]
#[command(name = "spotify-session")]
#[command(about = "Sign in to Spotify and browse your library from the terminal", long_about = None)]
struct Cli {
    /// Keep tokens in the OS keyring instead of the data directory
    #[arg(long, global = true)]
    keyring: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the browser and wait for the redirect
    Login,
    /// Forget the stored tokens
    Logout,
    /// Shows the signed-in profile
    Whoami,
    /// Lists your playlists with their IDs
    Playlists {
        #[arg(long, short = 'l', default_value_t = DEFAULT_LIMIT)]
        limit: u32,
    },
    /// Lists your most played tracks
    TopTracks {
        #[arg(long, short = 'l', default_value_t = DEFAULT_LIMIT)]
        limit: u32,
        /// short_term, medium_term or long_term
        #[arg(long, short = 't', default_value = "medium_term")]
        time_range: String,
    },
    /// Lists your Liked Songs
    SavedTracks {
        #[arg(long, short = 'l', default_value_t = DEFAULT_LIMIT)]
        limit: u32,
    },
    /// Lists the tracks of a playlist
    PlaylistTracks {
        #[arg(value_name = "PLAYLIST_ID")]
        playlist_id: String,
        #[arg(long, short = 'l', default_value_t = DEFAULT_PLAYLIST_TRACKS_LIMIT)]
        limit: u32,
    },
    /// Shows playlists, top tracks and Liked Songs together
    Library {
        #[arg(long, short = 'l', default_value_t = DEFAULT_LIMIT)]
        limit: u32,
        /// Print the library as JSON
        #[arg(long)]
        json: bool,
    },
    /// Opens a playlist in the Spotify web player
    Open {
        #[arg(value_name = "PLAYLIST_ID")]
        playlist_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let context = build_context(cli.keyring)?;

    match cli.command {
        Commands::Login => handle_login(&context).await,
        Commands::Logout => {
            context.session(Arc::new(BrowserNavigator)).logout();
            println!("Signed out.");
            Ok(())
        }
        Commands::Whoami => handle_whoami(&context).await,
        Commands::Playlists { limit } => {
            let page = api_call(context.api().playlists(limit).await)?;
            for playlist in &page.items {
                println!("{}  {}", playlist.id, playlist);
            }
            Ok(())
        }
        Commands::TopTracks { limit, time_range } => {
            let time_range: TimeRange = time_range.parse().map_err(|e: String| anyhow!(e))?;
            let page = api_call(context.api().top_tracks(limit, time_range).await)?;
            print_tracks(page.items.iter());
            Ok(())
        }
        Commands::SavedTracks { limit } => {
            let page = api_call(context.api().saved_tracks(limit).await)?;
            print_tracks(page.items.iter().map(|saved| &saved.track));
            Ok(())
        }
        Commands::PlaylistTracks { playlist_id, limit } => {
            let page = api_call(context.api().playlist_tracks(&playlist_id, limit).await)?;
            print_tracks(page.items.iter().filter_map(|item| item.track.as_ref()));
            Ok(())
        }
        Commands::Library { limit, json } => handle_library(&context, limit, json).await,
        Commands::Open { playlist_id } => {
            validate_id(&playlist_id)?;
            let url = Url::parse(&playlist_url(&playlist_id))?;
            BrowserNavigator.navigate(Route::External(url));
            Ok(())
        }
    }
}

fn build_context(keyring: bool) -> Result<Context> {
    let config = OAuthConfig::from_env().context("Invalid configuration")?;

    let storage: Arc<dyn KeyValueStore> = if keyring {
        Arc::new(KeyringStore::new(APP_NAME))
    } else {
        let store = FileStore::new(APP_NAME).map_err(|e| anyhow!(e))?;
        debug!("Storing tokens in {}", store.path().display());
        Arc::new(store)
    };

    Ok(Context::new(config, storage)?)
}

/// Turn an authentication failure into a hint to sign in again
fn api_call<T>(result: spotify_session::error::Result<T>) -> Result<T> {
    match result {
        Err(e) if e.is_auth_failure() => {
            bail!("{}. Run `{} login` to sign in.", e, APP_NAME)
        }
        other => Ok(other?),
    }
}

fn print_tracks<'a>(tracks: impl Iterator<Item = &'a Track>) {
    for (i, track) in tracks.enumerate() {
        match track.listen_url() {
            Some(url) => println!("{:>3}. {}  {}", i + 1, track, url),
            None => println!("{:>3}. {}", i + 1, track),
        }
    }
}

async fn handle_login(context: &Context) -> Result<()> {
    let navigator: Arc<dyn Navigator> = Arc::new(BrowserNavigator);
    let session = Arc::new(context.session(navigator.clone()));

    if let SessionState::Authenticated(user) = session.initialize().await {
        println!("Already signed in as {}", user);
        return Ok(());
    }

    let redirect_uri = context.client().config().redirect_uri.clone();
    let server = CallbackServer::bind(&redirect_uri)
        .await
        .with_context(|| format!("Could not listen on {}", redirect_uri))?;

    session.login()?;
    println!("Waiting for the browser to return to {} ...", redirect_uri);

    let pending = tokio::select! {
        redirect = server.accept(DEFAULT_REDIRECT_TIMEOUT) => redirect?,
        _ = tokio::signal::ctrl_c() => bail!("Login cancelled"),
    };

    let handler = Arc::new(CallbackHandler::new(
        session.clone(),
        navigator,
        CallbackTiming::default(),
    ));
    let mut status = handler.watch_status();
    let task = handler.clone().spawn(pending.params().clone());

    match status
        .wait_for(CallbackStatus::is_finished)
        .await
        .map(|finished| finished.clone())
    {
        Ok(finished) => {
            if let Err(e) = pending.respond(&finished).await {
                warn!("Could not answer the browser: {}", e);
            }
        }
        Err(e) => warn!("Callback status unavailable: {}", e),
    }

    let outcome = task
        .join()
        .await
        .ok_or_else(|| anyhow!("Callback handling was interrupted"))?;

    match outcome.result {
        Ok(user) => {
            println!("Signed in as {}", user);
            Ok(())
        }
        Err(e) => bail!("{} ({})", e.user_message(), e),
    }
}

async fn handle_whoami(context: &Context) -> Result<()> {
    let session = context.session(Arc::new(BrowserNavigator));

    match session.initialize().await {
        SessionState::Authenticated(user) => {
            println!("{}", user);
            if let Some(avatar) = user.avatar_url() {
                println!("Avatar: {}", avatar);
            }
        }
        _ => println!("Not signed in. Run `{} login` to sign in.", APP_NAME),
    }
    Ok(())
}

async fn handle_library(context: &Context, limit: u32, json: bool) -> Result<()> {
    let library = api_call(context.api().library(limit).await)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&library)?);
        return Ok(());
    }

    println!("Playlists ({})", library.playlists.len());
    for playlist in &library.playlists {
        println!("  {}  {}", playlist, playlist.open_url());
    }

    println!();
    println!("Top tracks ({})", library.top_tracks.len());
    print_tracks(library.top_tracks.iter());

    println!();
    println!("Liked Songs ({})", library.saved_tracks.len());
    print_tracks(library.saved_tracks.iter());
    Ok(())
}
