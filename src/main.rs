use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;

use vrc_album::config::Config;
use vrc_album::{logging, Gallery, PngChunkCodec, ThumbnailCache, ThumbnailService, UserSortType};

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    sort: UserSortType,
    search: Option<String>,
    thumbnails: bool,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("vrc-album {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                i += 1;
                match args.get(i) {
                    Some(path) => parsed.config_path = Some(PathBuf::from(path)),
                    None => bail!("--config requires a path argument"),
                }
            }
            "--sort" | "-s" => {
                i += 1;
                parsed.sort = match args.get(i).map(String::as_str) {
                    Some("none") => UserSortType::None,
                    Some("alpha") | Some("alphabetical") => UserSortType::Alphabetical,
                    Some("count") => UserSortType::ByCount,
                    Some(other) => bail!("Unknown sort mode: {}", other),
                    None => bail!("--sort requires one of none, alpha, count"),
                };
            }
            "--search" | "-q" => {
                i += 1;
                match args.get(i) {
                    Some(prefix) => parsed.search = Some(prefix.clone()),
                    None => bail!("--search requires a user name prefix"),
                }
            }
            "--thumbnails" | "-t" => {
                parsed.thumbnails = true;
            }
            other => {
                print_help();
                bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    Ok(parsed)
}

fn print_help() {
    println!(
        r#"vrc-album - browse VRChat screenshots by the users in them

USAGE:
    vrc-album [OPTIONS]

OPTIONS:
    --config, -c PATH     Path to settings file (.json or .toml)
    --sort, -s MODE       User list order: none, alpha, count
    --search, -q PREFIX   Only list photos with a user starting with PREFIX
    --thumbnails, -t      Generate thumbnails for the listed photos
    --version, -V         Show version
    --help, -h            Show this help message

ENVIRONMENT:
    VRC_ALBUM_CONFIG      Path to settings file (overrides default location)
    VRC_ALBUM_LOG         Log level (trace, debug, info, warn, error)

Settings file location: $XDG_CONFIG_HOME/vrc-album/settings.json"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    let log_guard = match logging::init(Some(Config::config_dir().join("logs"))) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging disabled: {:#}", e);
            None
        }
    };

    let config = match args.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let log_backend = log_guard
        .as_ref()
        .map_or_else(|| "none".to_string(), |g| g.backend().to_string());
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log = %log_backend,
        folder = ?config.folder_path,
        cache = ?config.thumbnails.path,
        divisor = config.thumbnails.scale_divisor,
        "vrc-album starting"
    );

    let cache = Arc::new(ThumbnailCache::new(&config.thumbnails));
    let service = ThumbnailService::new(cache, tokio::runtime::Handle::current());
    let codec = PngChunkCodec::new();

    let mut gallery = Gallery::open(&config, &codec, service)?;
    gallery.users_mut().set_sort_type(args.sort);

    if let Some(ref prefix) = args.search {
        gallery.search(prefix);
    }

    println!("Users ({}):", gallery.users().len());
    for user in gallery.users().sorted_users() {
        println!("  {:<32} {}", user.name, user.photo_count);
    }

    println!();
    println!("Photos ({} of {}):", gallery.displayed_len(), gallery.photos().len());
    for photo in gallery.displayed() {
        let world = photo.world().unwrap_or("-");
        let users: Vec<&str> = photo.user_names().collect();
        println!("  {}  [{}]  {}", photo, world, users.join(", "));
    }

    if args.thumbnails {
        let summary = gallery.load_displayed_thumbnails().await;
        println!();
        println!(
            "Thumbnails: {} ready, {} failed",
            summary.resolved, summary.failed
        );
    }

    Ok(())
}
