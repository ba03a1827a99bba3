use arcade_client::app::App;
use arcade_client::config::ClientConfig;
use arcade_client::services::resolve_identity;
use arcade_client::session::SessionContext;
use clap::Parser;
use log::{error, info};
use macroquad::window::Conf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game server host
    #[arg(long, env = "ARCADE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Game server port
    #[arg(short = 'p', long, env = "ARCADE_PORT", default_value = "8080")]
    port: u16,

    /// Name used when no identity endpoint is configured or reachable
    #[arg(short = 'u', long, env = "ARCADE_USER", default_value = "player")]
    username: String,

    /// Identity endpoint returning {id, username}
    #[arg(long, env = "ARCADE_IDENTITY_URL")]
    identity_url: Option<String>,

    /// Endpoint receiving {winnerId, scoreA, scoreB} at game over
    #[arg(long, env = "ARCADE_RESULTS_URL")]
    results_url: Option<String>,

    /// Cosmetic skin: classic, neon or mono
    #[arg(long, env = "ARCADE_SKIN", default_value = "classic")]
    skin: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "900")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: i32,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Arcade".to_owned(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    if let Err(e) = run().await {
        error!("Client failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}:{}", args.host, args.port);
    info!("Menu: 1-5 pick a mode, Esc cancels or quits a match");
    info!("Controls: W/S or arrows move the paddle, 1/2/3 spawn troops");

    let config = ClientConfig::resolve(&args.host, args.port)?
        .with_services(args.identity_url.clone(), args.results_url.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let identity = runtime.block_on(resolve_identity(
        config.identity_url.as_deref(),
        &args.username,
    ));

    let ctx = SessionContext::new(identity, args.skin, config);
    App::new(ctx, runtime).run().await;

    Ok(())
}
