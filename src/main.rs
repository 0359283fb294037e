use std::{
    path::{Path, PathBuf},
    process,
    str::FromStr,
    time::Duration,
};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use url::Url;

use melodia::{
    audio::{self, Output},
    catalog::{Catalog, NewAlbum, NewSong},
    config::Config,
    credentials::Credentials,
    error::{Error, ErrorKind, Result},
    events::Event,
    gateway::Gateway,
    player::Player,
    protocol::User,
    search,
    util::format_time,
    volume::{Preferences, Volume},
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// How often the player checks whether a song finished or needs fetching.
const TICK: Duration = Duration::from_millis(250);

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the REST backend
    #[arg(long, env = "MELODIA_API_URL", value_hint = ValueHint::Url, default_value = Config::DEFAULT_API_URL)]
    api_url: Url,

    /// Secrets file
    ///
    /// Holds the email and password used by commands that need to sign in.
    /// Ensure that this file is kept secure and not shared publicly.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value = "secrets.toml")]
    secrets_file: PathBuf,

    /// Preferences file
    ///
    /// Remembers the volume across runs.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value = Config::DEFAULT_PREFERENCES_FILE)]
    preferences_file: PathBuf,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Play the catalog interactively (default)
    Play,

    /// Search songs, artists and albums
    Search {
        #[arg(required = true)]
        keywords: Vec<String>,
    },

    /// List all songs
    Songs,

    /// List all albums
    Albums,

    /// List all artists
    Artists,

    /// List all genres (requires signing in)
    Genres,

    /// Show the signed-in account
    Whoami,

    /// Upload a new song (administrators only)
    AddSong {
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist_id: String,
        #[arg(long, value_hint = ValueHint::FilePath)]
        cover: PathBuf,
        #[arg(long, value_hint = ValueHint::FilePath)]
        audio: PathBuf,
    },

    /// Replace the audio file of a song (administrators only)
    ReplaceAudio {
        song_id: String,
        #[arg(value_hint = ValueHint::FilePath)]
        audio: PathBuf,
    },

    /// Set the genres of a song (administrators only)
    SetGenres {
        song_id: String,
        genre_ids: Vec<String>,
    },

    /// Delete a song (administrators only)
    DeleteSong { song_id: String },

    /// Create an album (administrators only)
    AddAlbum {
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist_id: String,
        /// Release date, for example 2024-11-02
        #[arg(long)]
        release_date: String,
        #[arg(long, value_hint = ValueHint::FilePath)]
        cover: Option<PathBuf>,
    },

    /// Add a song to an album (administrators only)
    AlbumAddSong { album_id: String, song_id: String },
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Signs in with the credentials in `secrets_file`, recording the session in
/// `signed_in`.
async fn sign_in(gateway: &Gateway, secrets_file: &Path, signed_in: &mut bool) -> Result<()> {
    let credentials = Credentials::from_file(secrets_file).inspect_err(|e| {
        if e.kind == ErrorKind::NotFound {
            info!(
                "put your email and password in {}, see secrets.toml.example",
                secrets_file.display()
            );
        }
    })?;

    gateway.sign_in(&credentials).await?;
    *signed_in = true;
    Ok(())
}

/// Signs in and checks that the account may change the catalog.
async fn sign_in_as_admin(
    gateway: &Gateway,
    secrets_file: &Path,
    signed_in: &mut bool,
) -> Result<User> {
    sign_in(gateway, secrets_file, signed_in).await?;

    let user = gateway.me().await?;
    if !user.is_admin() {
        return Err(Error::permission_denied(format!(
            "{} is not an administrator",
            user.username
        )));
    }

    Ok(user)
}

/// Commands understood by the interactive player.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Input {
    List,
    Play(usize),
    Next,
    Previous,
    Pause,
    Loop,
    Volume(Volume),
    Seek(Duration),
    Status,
    History,
    Help,
    Quit,
}

impl FromStr for Input {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace();
        let command = words.next().unwrap_or_default();
        let argument = words.next();

        let input = match (command, argument) {
            ("list" | "ls", None) => Self::List,
            ("play" | "p", Some(number)) => Self::Play(number.parse()?),
            ("next" | "n", None) => Self::Next,
            ("prev" | "previous", None) => Self::Previous,
            ("pause" | "", None) => Self::Pause,
            ("loop", None) => Self::Loop,
            ("vol" | "volume", Some(volume)) => Self::Volume(volume.parse()?),
            ("seek", Some(seconds)) => Self::Seek(Duration::from_secs(seconds.parse()?)),
            ("status", None) => Self::Status,
            ("history", None) => Self::History,
            ("help" | "?", None) => Self::Help,
            ("quit" | "q" | "exit", None) => Self::Quit,
            _ => {
                return Err(Error::invalid_argument(format!(
                    "unknown command \"{}\", type \"help\" for a list",
                    s.trim()
                )))
            }
        };

        Ok(input)
    }
}

fn print_help() {
    println!(
        "commands: list, play <n>, next, prev, pause, loop, vol <0-100>, seek <secs>, \
         status, history, quit"
    );
}

fn print_status<O: Output>(player: &Player<O>) {
    match player.current() {
        Some(song) => println!(
            "{} {song} [{}]{} volume {}",
            if player.is_playing() { "playing" } else { "paused" },
            format_time(player.position()),
            if player.is_looping() { " looping," } else { "," },
            player.volume(),
        ),
        None => println!("nothing playing, volume {}", player.volume()),
    }
}

/// Applies one interactive command. Returns `false` to quit.
fn handle<O: Output>(input: Input, player: &mut Player<O>, preferences: &Preferences) -> bool {
    match input {
        Input::List => {
            for (number, song) in player.catalog().iter().enumerate() {
                println!("{:>3}. {song}", number + 1);
            }
        }
        Input::Play(number) => {
            match number
                .checked_sub(1)
                .and_then(|index| player.catalog().get(index))
            {
                Some(song) => {
                    let song = song.clone();
                    player.play(song);
                }
                None => println!("no song numbered {number}"),
            }
        }
        Input::Next => player.next(),
        Input::Previous => player.previous(),
        Input::Pause => {
            if !player.toggle_play_pause() {
                println!("nothing loaded, use \"play <n>\" or \"next\"");
            }
        }
        Input::Loop => player.toggle_loop(),
        Input::Volume(volume) => {
            player.set_volume(volume);
            if let Err(e) = preferences.set_volume(volume) {
                warn!("could not store volume: {e}");
            }
        }
        Input::Seek(position) => player.seek(position),
        Input::Status => print_status(player),
        Input::History => {
            if player.history().is_empty() {
                println!("no history");
            }
            for song in player.history().iter().rev() {
                println!("  {song}");
            }
        }
        Input::Help => print_help(),
        Input::Quit => return false,
    }

    true
}

/// Interactive player loop.
///
/// Commands arrive on standard input. A periodic tick fetches songs that
/// were loaded and detects songs that played to their end.
async fn play(config: &Config, gateway: &Gateway) -> Result<()> {
    let mut catalog = Catalog::default();
    let songs = catalog.fetch_songs(gateway).await?;
    info!("{} songs available", songs.len());

    let preferences = Preferences::new(&config.preferences_file);
    let volume = preferences.volume();

    let mut player = Player::new(audio::Sink::open(volume)?);
    player.set_volume(volume);
    player.set_catalog(catalog.songs().to_vec());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    player.set_event_sender(event_tx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    print_help();

    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down gracefully");
                break;
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };

                match line.parse::<Input>() {
                    Ok(input) => {
                        if !handle(input, &mut player, &preferences) {
                            break;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }

            Some(event) = event_rx.recv() => {
                match event {
                    Event::TrackChanged => {
                        if let Some(song) = player.current() {
                            println!("now playing: {song}");
                        }
                    }
                    Event::LoopChanged(looping) => {
                        println!("looping {}", if looping { "on" } else { "off" });
                    }
                    Event::Play | Event::Pause | Event::Restarted => debug!("{event:?}"),
                }
            }

            _ = tick.tick() => {
                if player.output().is_pending() {
                    if let Err(e) = player.output_mut().resolve(gateway.transport()).await {
                        player.on_output_error(&e);
                    }
                }

                if player.output_mut().take_finished() {
                    player.on_playback_ended();
                }
            }
        }
    }

    Ok(())
}

/// Runs the requested command, ending any session it started.
async fn run(args: Args) -> Result<()> {
    let mut config = Config::new(args.api_url)?;
    config.preferences_file = args.preferences_file;

    let gateway = Gateway::new(&config)?;
    let command = args.command.unwrap_or(Command::Play);

    let mut signed_in = false;
    let result = execute(command, &config, &gateway, &args.secrets_file, &mut signed_in).await;

    if signed_in {
        if let Err(e) = gateway.sign_out().await {
            warn!("signing out failed: {e}");
        }
    }

    result
}

async fn execute(
    command: Command,
    config: &Config,
    gateway: &Gateway,
    secrets_file: &Path,
    signed_in: &mut bool,
) -> Result<()> {
    let mut catalog = Catalog::default();

    match command {
        Command::Play => play(config, gateway).await?,

        Command::Search { keywords } => {
            match search::search(gateway, &keywords.join(" ")).await? {
                Some(results) if !results.is_empty() => {
                    if let Some(best) = results.best_result {
                        println!(
                            "best result: {} ({}) by {}",
                            best.title,
                            best.category,
                            best.artists.join(", ")
                        );
                    }
                    for song in results.tracks {
                        println!("song    {song}");
                    }
                    for artist in results.artists {
                        println!("artist  {}", artist.name);
                    }
                    for album in results.albums {
                        println!("album   {}", album.title);
                    }
                }
                _ => println!("no results"),
            }
        }

        Command::Songs => {
            for song in catalog.fetch_songs(gateway).await? {
                println!("{}  {song}", song.id);
            }
        }

        Command::Albums => {
            for album in catalog.fetch_albums(gateway).await? {
                println!(
                    "{}  {} ({} songs)",
                    album.id,
                    album.title,
                    album.songs.len()
                );
            }
        }

        Command::Artists => {
            sign_in(gateway, secrets_file, signed_in).await?;
            for artist in catalog.fetch_artists(gateway).await? {
                println!("{}  {}", artist.id, artist.name);
            }
        }

        Command::Genres => {
            sign_in(gateway, secrets_file, signed_in).await?;
            for genre in catalog.fetch_genres(gateway).await? {
                println!("{}  {}", genre.id, genre.name);
            }
        }

        Command::Whoami => {
            sign_in(gateway, secrets_file, signed_in).await?;
            let user = gateway.me().await?;
            println!("{} <{}>, {}", user.username, user.email, user.role);
        }

        Command::AddSong {
            title,
            artist_id,
            cover,
            audio,
        } => {
            sign_in_as_admin(gateway, secrets_file, signed_in).await?;
            let song = NewSong {
                title,
                artist_id,
                cover_image: cover,
                audio_file: audio,
            };
            let created = catalog.create_song(gateway, &song).await?;
            println!("{}  {created}", created.id);
        }

        Command::ReplaceAudio { song_id, audio } => {
            sign_in_as_admin(gateway, secrets_file, signed_in).await?;
            catalog
                .update_song_file(gateway, &song_id, &audio)
                .await?;
        }

        Command::SetGenres { song_id, genre_ids } => {
            sign_in_as_admin(gateway, secrets_file, signed_in).await?;
            catalog
                .update_song_genres(gateway, &song_id, &genre_ids)
                .await?;
        }

        Command::DeleteSong { song_id } => {
            sign_in_as_admin(gateway, secrets_file, signed_in).await?;
            catalog.delete_song(gateway, &song_id).await?;
        }

        Command::AddAlbum {
            title,
            artist_id,
            release_date,
            cover,
        } => {
            sign_in_as_admin(gateway, secrets_file, signed_in).await?;
            let album = NewAlbum {
                title,
                artist_id,
                release_date,
                cover_image: cover,
            };
            let created = catalog.create_album(gateway, &album).await?;
            println!("{}  {}", created.id, created.title);
        }

        Command::AlbumAddSong { album_id, song_id } => {
            sign_in_as_admin(gateway, secrets_file, signed_in).await?;
            let album = catalog
                .add_song_to_album(gateway, &album_id, &song_id)
                .await?;
            println!("{} now has {} songs", album.title, album.songs.len());
        }
    }

    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the requested command.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();
    let lang = String::from("en");

    info!("starting {name}/{version}; {BUILD_PROFILE}; {lang}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interactive_commands() {
        assert_eq!("play 3".parse::<Input>().unwrap(), Input::Play(3));
        assert_eq!(" next ".parse::<Input>().unwrap(), Input::Next);
        assert_eq!("".parse::<Input>().unwrap(), Input::Pause);
        assert_eq!(
            "vol 35".parse::<Input>().unwrap(),
            Input::Volume(Volume::new(35))
        );
        assert_eq!(
            "seek 90".parse::<Input>().unwrap(),
            Input::Seek(Duration::from_secs(90))
        );
        assert!("vol 300".parse::<Input>().is_err());
        assert!("play".parse::<Input>().is_err());
        assert!("dance".parse::<Input>().is_err());
    }

    #[test]
    fn parses_arguments() {
        let args = Args::try_parse_from(["melodia", "-v", "set-genres", "s1", "g1", "g2"]).unwrap();
        assert_eq!(args.verbose, 1);
        assert_eq!(
            args.command,
            Some(Command::SetGenres {
                song_id: "s1".to_string(),
                genre_ids: vec!["g1".to_string(), "g2".to_string()],
            })
        );
        assert_eq!(args.api_url.as_str(), Config::DEFAULT_API_URL);
    }
}
