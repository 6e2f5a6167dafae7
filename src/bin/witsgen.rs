use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use witsgen::{Config, Location, geo, overlay, video};

#[derive(Parser, Debug)]
#[command(name = "witsgen", version)]
struct Cli {
    /// JSON config file; compiled-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Generate a single video for one IP without the server (requires
    /// `ffmpeg`/`ffprobe` on PATH).
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Override the configured listen address.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Override the generated-output directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// IP address shown on the first overlay line (and fed to GeoIP).
    #[arg(long)]
    ip: String,

    /// Skip the GeoIP lookup and use this city.
    #[arg(long)]
    city: Option<String>,

    /// Skip the GeoIP lookup and use this country.
    #[arg(long)]
    country: Option<String>,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    match cli.cmd {
        Command::Serve(args) => cmd_serve(config, args).await,
        Command::Render(args) => cmd_render(config, args),
    }
}

async fn cmd_serve(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    witsgen::server::run(config).await
}

fn cmd_render(config: Config, args: RenderArgs) -> anyhow::Result<()> {
    config.prepare()?;

    let location = match (args.city, args.country) {
        (None, None) => geo::resolve(&config.assets.geoip_db, &args.ip),
        (city, country) => Location {
            city: city.unwrap_or_else(|| "Unknown".to_owned()),
            country: country.unwrap_or_else(|| "Unknown".to_owned()),
        },
    };

    let frame = overlay::render(
        &config.style,
        &config.assets.font,
        &config.assets.base_image,
        &args.ip,
        &location.to_string(),
    )?;
    video::assemble(&config.assets, &frame, &args.out)?;
    println!("{}", args.out.display());
    Ok(())
}
