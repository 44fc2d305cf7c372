use anyhow::Context;
use clap::{Parser, Subcommand};
use parley_auth::AuthError;
use parley_config::load as load_config;
use parley_database::CreateMessageRequest;
use parley_gateway::{build_router, AppState};
use parley_runtime::{telemetry, BackendServices};
use tokio::net::TcpListener;
use tracing::info;

const DEMO_PASSWORD: &str = "password123";
const DEMO_USERS: [(&str, &str); 2] = [
    ("alice@example.com", "Alice"),
    ("bob@example.com", "Bob"),
];

#[derive(Parser)]
#[command(name = "parley-server")]
#[command(about = "Parley presence and direct-message relay (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and relay server
    Serve,
    /// Create the demo users alice@example.com and bob@example.com
    SeedData,
    /// Print users, chats and message counts
    DumpData,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::SeedData => seed_data().await,
        Commands::DumpData => dump_data().await,
    }
}

async fn bootstrap() -> anyhow::Result<(parley_config::AppConfig, BackendServices)> {
    let config = load_config().context("failed to load configuration")?;
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    Ok((config, services))
}

async fn run_server() -> anyhow::Result<()> {
    info!("starting Parley server");

    let (config, services) = bootstrap().await?;

    let state = AppState::from_services(&services)
        .with_allowed_origins(config.http.allowed_origins.clone());
    let app = build_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(parley_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    info!("server shut down");
    Ok(())
}

async fn seed_data() -> anyhow::Result<()> {
    info!("seeding demo users");

    let (_config, services) = bootstrap().await?;
    let authenticator = &services.authenticator;

    let mut ids = Vec::with_capacity(DEMO_USERS.len());
    for (email, display_name) in DEMO_USERS {
        let user = match authenticator
            .register_with_password(email, DEMO_PASSWORD, Some(display_name))
            .await
        {
            Ok(user) => {
                println!("created {email} ({})", user.public_id);
                user
            }
            Err(AuthError::UserExists) => {
                let (user, _session) = authenticator
                    .login_with_password(email, DEMO_PASSWORD)
                    .await
                    .with_context(|| format!("{email} exists with a different password"))?;
                println!("{email} already present ({})", user.public_id);
                user
            }
            Err(err) => return Err(err).with_context(|| format!("failed to create {email}")),
        };
        ids.push(user.public_id);
    }

    let chat = services
        .chats
        .find_or_create(&ids[0], &ids[1])
        .await
        .context("failed to create demo chat")?;
    if services.messages.count_for_chat(&chat.public_id).await? == 0 {
        services
            .messages
            .append(&CreateMessageRequest::new(
                &chat.public_id,
                &ids[0],
                "Hi Bob, welcome to Parley!",
            ))
            .await
            .context("failed to insert demo message")?;
    }

    println!("demo chat {} ready; password for both users: {DEMO_PASSWORD}", chat.public_id);
    Ok(())
}

async fn dump_data() -> anyhow::Result<()> {
    let (_config, services) = bootstrap().await?;

    let users = services
        .authenticator
        .list_users()
        .await
        .context("failed to list users")?;

    println!("=== USERS ===");
    if users.is_empty() {
        println!("No users found in database");
    } else {
        println!("{:<28} {:<30} {:<20}", "ID", "Email", "Display Name");
        println!("{}", "-".repeat(80));
        for user in &users {
            println!(
                "{:<28} {:<30} {:<20}",
                user.public_id,
                user.email,
                user.display_name.as_deref().unwrap_or("-")
            );
        }
    }

    let chats = services
        .chats
        .list_all()
        .await
        .context("failed to list chats")?;

    println!();
    println!("=== CHATS ===");
    if chats.is_empty() {
        println!("No chats found in database");
        return Ok(());
    }

    println!(
        "{:<28} {:<28} {:<28} {:<10} {:<30}",
        "ID", "Creator", "Peer", "Messages", "Last Activity"
    );
    println!("{}", "-".repeat(128));
    for chat in chats {
        let count = services
            .messages
            .count_for_chat(&chat.public_id)
            .await
            .with_context(|| format!("failed to count messages in {}", chat.public_id))?;
        let [creator, peer] = &chat.participants;
        println!(
            "{:<28} {:<28} {:<28} {:<10} {:<30}",
            chat.public_id, creator, peer, count, chat.updated_at
        );
    }

    Ok(())
}
